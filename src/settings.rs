//! Translation settings (§6). CLI-flag-driven rather than file-driven —
//! there is no separate `.pygrc`; defaults live here and flags override them.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub builddir: PathBuf,
    pub deprefix: PathBuf,
    pub generator: Generator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    Ninja,
}

impl Settings {
    pub fn new(builddir: PathBuf, deprefix: PathBuf) -> Self {
        Settings {
            builddir,
            deprefix,
            generator: Generator::Ninja,
        }
    }
}
