//! Project graph loading (§4.3): parses a root GYP-style file, recursively
//! resolves cross-project dependencies with realpath-based deduplication,
//! and produces a fully resolved target list per project.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::expr;
use crate::merge::{self, MergeMode};
use crate::pathutil;
use crate::unroll;
use crate::value::{ProtoMap, Value as VarValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    None,
    Executable,
    StaticLibrary,
    SharedLibrary,
}

impl TargetKind {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(TargetKind::None),
            "executable" => Ok(TargetKind::Executable),
            "static_library" => Ok(TargetKind::StaticLibrary),
            "shared_library" => Ok(TargetKind::SharedLibrary),
            other => Err(Error::gyp(format!("unknown target type '{other}'"))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TargetKind::StaticLibrary => ".a",
            TargetKind::SharedLibrary => ".so",
            TargetKind::Executable | TargetKind::None => "",
        }
    }

    pub fn is_linkable(&self) -> bool {
        !matches!(self, TargetKind::Executable)
    }
}

pub mod source_flags {
    pub const C: u8 = 0x1;
    pub const CXX: u8 = 0x2;
    pub const OBJC: u8 = 0x4;
    pub const OBJCXX: u8 = 0x8;
    pub const LINK: u8 = 0x10;
    pub const SKIP: u8 = 0x20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCategory {
    C,
    Cxx,
    ObjC,
    ObjCxx,
    Link,
    Skip,
}

impl SourceCategory {
    fn classify(path: &Path) -> SourceCategory {
        match pathutil::extension(path).as_str() {
            "c" => SourceCategory::C,
            "cc" | "cpp" => SourceCategory::Cxx,
            "m" => SourceCategory::ObjC,
            "mm" => SourceCategory::ObjCxx,
            "o" | "so" | "dylib" | "dll" => SourceCategory::Link,
            _ => SourceCategory::Skip,
        }
    }

    fn bitflag(self) -> u8 {
        match self {
            SourceCategory::C => source_flags::C,
            SourceCategory::Cxx => source_flags::CXX,
            SourceCategory::ObjC => source_flags::OBJC,
            SourceCategory::ObjCxx => source_flags::OBJCXX,
            SourceCategory::Link => source_flags::LINK,
            SourceCategory::Skip => source_flags::SKIP,
        }
    }

    pub fn is_compilable(self) -> bool {
        matches!(
            self,
            SourceCategory::C | SourceCategory::Cxx | SourceCategory::ObjC | SourceCategory::ObjCxx
        )
    }

    pub fn is_cxx_like(self) -> bool {
        matches!(self, SourceCategory::Cxx | SourceCategory::ObjCxx)
    }
}

#[derive(Debug, Clone)]
pub struct Source {
    pub category: SourceCategory,
    pub path: PathBuf,
    pub out: Option<String>,
}

pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub project: Weak<RefCell<Project>>,
    pub deps: Vec<Rc<RefCell<Target>>>,
    pub sources: Vec<Source>,
    pub source_types: u8,
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub libs: Vec<String>,
    pub cflags: String,
    pub ldflags: String,
    pub vars: Rc<RefCell<ProtoMap>>,
    json: Json,
}

pub struct Project {
    pub id: u32,
    pub path: PathBuf,
    pub dir: PathBuf,
    pub parent: Option<Weak<RefCell<Project>>>,
    pub clone: Json,
    pub vars: Rc<RefCell<ProtoMap>>,
    pub targets: Vec<Rc<RefCell<Target>>>,
    pub target_index: HashMap<String, usize>,
}

/// Owns the realpath-keyed registry that gives every project its identity
/// (§3 invariant: "Project identity = realpath"). This lives outside
/// `Project` itself — only the root conceptually needs it, and keeping it on
/// a dedicated loader avoids giving every non-root node a field it never
/// populates.
pub struct Loader {
    registry: HashMap<PathBuf, Rc<RefCell<Project>>>,
    order: Vec<Rc<RefCell<Project>>>,
    next_id: u32,
}

impl Loader {
    pub fn load_root(path: impl AsRef<Path>) -> Result<(Loader, Rc<RefCell<Project>>)> {
        let mut loader = Loader {
            registry: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
        };
        let root = loader.new_child(path.as_ref(), None)?;
        Ok((loader, root))
    }

    /// All loaded projects in creation order, root first.
    pub fn projects(&self) -> &[Rc<RefCell<Project>>] {
        &self.order
    }

    fn new_child(
        &mut self,
        path: &Path,
        parent: Option<Rc<RefCell<Project>>>,
    ) -> Result<Rc<RefCell<Project>>> {
        let real = pathutil::realpath(path)?;
        if let Some(existing) = self.registry.get(&real) {
            return Ok(Rc::clone(existing));
        }

        let json = parse_jsonc_file(&real)?;
        let clone = merge::clone_under_mode(&json, MergeMode::Auto);
        let dir = pathutil::dirname(&real);
        // A project's environment never chains onto the project that referred
        // it in (no such parent relationship exists in §4.1/§4.2 — only a
        // target's environment chains onto its owning project's). `parent`
        // here is purely the structural back-reference below.
        let vars = ProtoMap::root();

        let id = self.next_id;
        self.next_id += 1;

        let project = Rc::new(RefCell::new(Project {
            id,
            path: real.clone(),
            dir,
            parent: parent.as_ref().map(Rc::downgrade),
            clone,
            vars,
            targets: Vec::new(),
            target_index: HashMap::new(),
        }));

        self.registry.insert(real, Rc::clone(&project));
        self.order.push(Rc::clone(&project));

        self.load(&project)?;

        Ok(project)
    }

    fn load(&mut self, project: &Rc<RefCell<Project>>) -> Result<()> {
        let env = Rc::clone(&project.borrow().vars);
        {
            let mut proj = project.borrow_mut();
            let mut top = match std::mem::replace(&mut proj.clone, Json::Null) {
                Json::Object(m) => m,
                other => {
                    proj.clone = other;
                    return Err(Error::gyp(format!(
                        "project file {} must be a JSON object",
                        proj.path.display()
                    )));
                }
            };
            ingest_variables(&top, &env)?;
            ingest_conditions(&mut top, &env)?;
            proj.clone = Json::Object(top);
        }

        let target_jsons: Vec<Json> = match project.borrow().clone.get("targets") {
            Some(Json::Array(arr)) => arr.clone(),
            Some(_) => return Err(Error::gyp("'targets' must be an array")),
            None => Vec::new(),
        };

        for raw in target_jsons {
            let mut obj = match raw {
                Json::Object(m) => m,
                _ => return Err(Error::gyp("each target entry must be an object")),
            };

            let target_env = ProtoMap::child(&project.borrow().vars);
            ingest_variables(&obj, &target_env)?;
            ingest_conditions(&mut obj, &target_env)?;

            let name = obj
                .get("target_name")
                .and_then(Json::as_str)
                .ok_or_else(|| Error::gyp("target missing required 'target_name'"))?
                .to_string();

            let kind = match obj.get("type").and_then(Json::as_str) {
                Some(s) => TargetKind::from_str(s)?,
                None => TargetKind::Executable,
            };

            let mut proj = project.borrow_mut();
            if proj.target_index.contains_key(&name) {
                return Err(Error::gyp(format!(
                    "duplicate target name '{name}' in {}",
                    proj.path.display()
                )));
            }

            let target = Rc::new(RefCell::new(Target {
                name: name.clone(),
                kind,
                project: Rc::downgrade(project),
                deps: Vec::new(),
                sources: Vec::new(),
                source_types: 0,
                include_dirs: Vec::new(),
                defines: Vec::new(),
                libs: Vec::new(),
                cflags: String::new(),
                ldflags: String::new(),
                vars: target_env,
                json: Json::Object(obj),
            }));

            let index = proj.targets.len();
            proj.targets.push(target);
            proj.target_index.insert(name, index);
        }

        let target_count = project.borrow().targets.len();
        for idx in 0..target_count {
            self.resolve_target(project, idx)?;
        }

        Ok(())
    }

    fn resolve_target(&mut self, project: &Rc<RefCell<Project>>, idx: usize) -> Result<()> {
        let target = Rc::clone(&project.borrow().targets[idx]);
        let dir = project.borrow().dir.clone();
        let json = target.borrow().json.clone();
        let env = Rc::clone(&target.borrow().vars);

        if let Some(Json::Array(deps)) = json.get("dependencies") {
            for dep in deps {
                let raw = dep
                    .as_str()
                    .ok_or_else(|| Error::gyp("dependency entries must be strings"))?;
                let dep_str = unroll::unroll_str(&env, raw)?;
                let resolved = self.resolve_dependency(project, &dep_str)?;
                if !resolved.borrow().kind.is_linkable() {
                    return Err(Error::gyp(format!(
                        "target '{}' cannot depend on executable '{}'",
                        target.borrow().name,
                        dep_str
                    )));
                }
                target.borrow_mut().deps.push(resolved);
            }
        }

        if let Some(Json::Array(dirs)) = json.get("include_dirs") {
            for d in dirs {
                let raw = d
                    .as_str()
                    .ok_or_else(|| Error::gyp("include_dirs entries must be strings"))?;
                let unrolled = unroll::unroll_str(&env, raw)?;
                let resolved = resolve_and_realpath(&dir, &unrolled)?;
                target.borrow_mut().include_dirs.push(resolved);
            }
        }

        if let Some(Json::Array(defs)) = json.get("defines") {
            for d in defs {
                let s = d
                    .as_str()
                    .ok_or_else(|| Error::gyp("defines entries must be strings"))?;
                target.borrow_mut().defines.push(unroll::unroll_str(&env, s)?);
            }
        }

        if let Some(Json::Array(libs)) = json.get("libraries") {
            for l in libs {
                let s = l
                    .as_str()
                    .ok_or_else(|| Error::gyp("libraries entries must be strings"))?;
                target.borrow_mut().libs.push(unroll::unroll_str(&env, s)?);
            }
        }

        if let Some(flags) = json.get("cflags").and_then(Json::as_str) {
            target.borrow_mut().cflags = unroll::unroll_str(&env, flags)?;
        }
        if let Some(flags) = json.get("ldflags").and_then(Json::as_str) {
            target.borrow_mut().ldflags = unroll::unroll_str(&env, flags)?;
        }

        if let Some(Json::Array(sources)) = json.get("sources") {
            for (i, src) in sources.iter().enumerate() {
                let raw = src
                    .as_str()
                    .ok_or_else(|| Error::gyp("source entries must be strings"))?;
                let unrolled = unroll::unroll_str(&env, raw)?;
                let path = resolve_and_realpath(&dir, &unrolled)?;
                let category = SourceCategory::classify(&path);
                // Suffix tracks position in the full `sources` array, matching
                // the reference generator's raw loop index rather than a
                // count of compilable entries seen so far.
                let out = if category.is_compilable() {
                    Some(format!("{}_{}.o", pathutil::stem(&path), i))
                } else {
                    None
                };

                let mut t = target.borrow_mut();
                t.source_types |= category.bitflag();
                t.sources.push(Source { category, path, out });
            }
        }

        Ok(())
    }

    fn resolve_dependency(
        &mut self,
        project: &Rc<RefCell<Project>>,
        dep: &str,
    ) -> Result<Rc<RefCell<Target>>> {
        if let Some((path_part, name)) = dep.split_once(':') {
            let dir = project.borrow().dir.clone();
            let child_path = pathutil::resolve_relative(&dir, path_part);
            let child = self.new_child(&child_path, Some(Rc::clone(project)))?;
            let idx = {
                let child_ref = child.borrow();
                *child_ref.target_index.get(name).ok_or_else(|| {
                    Error::gyp(format!(
                        "unknown target '{name}' in {}",
                        child_ref.path.display()
                    ))
                })?
            };
            let child_ref = child.borrow();
            Ok(Rc::clone(&child_ref.targets[idx]))
        } else {
            let proj = project.borrow();
            let idx = *proj
                .target_index
                .get(dep)
                .ok_or_else(|| Error::gyp(format!("unknown local target '{dep}'")))?;
            Ok(Rc::clone(&proj.targets[idx]))
        }
    }
}

fn resolve_and_realpath(dir: &Path, raw: &str) -> Result<PathBuf> {
    if raw.starts_with('-') || raw.starts_with('$') {
        return Ok(PathBuf::from(raw));
    }
    let joined = pathutil::resolve_relative(dir, raw);
    pathutil::realpath(&joined)
}

fn ingest_variables(obj: &Map<String, Json>, env: &Rc<RefCell<ProtoMap>>) -> Result<()> {
    let vars = match obj.get("variables") {
        Some(Json::Object(v)) => v,
        Some(_) => return Err(Error::gyp("'variables' must be an object")),
        None => return Ok(()),
    };

    for (raw_key, json_val) in vars {
        let (is_default, name) = match raw_key.strip_suffix('%') {
            Some(n) => (true, n),
            None => (false, raw_key.as_str()),
        };

        if is_default && env.borrow().contains_local_or_ancestor(name) {
            continue;
        }

        let value = VarValue::from_json(json_val)?;
        let value = unroll::unroll_value(env, &value)?;
        env.borrow_mut().define(name, value);
    }

    Ok(())
}

fn ingest_conditions(obj: &mut Map<String, Json>, env: &Rc<RefCell<ProtoMap>>) -> Result<()> {
    let conditions = match obj.get("conditions") {
        Some(Json::Array(arr)) => arr.clone(),
        Some(_) => return Err(Error::gyp("'conditions' must be an array")),
        None => return Ok(()),
    };

    for entry in &conditions {
        let pair = entry
            .as_array()
            .ok_or_else(|| Error::gyp("each condition entry must be an array"))?;
        if pair.is_empty() {
            continue;
        }

        let test = pair[0]
            .as_str()
            .ok_or_else(|| Error::gyp("condition test must be a string"))?;
        let holds = expr::eval_test(test, env)?;

        let branch = if holds {
            pair.get(1)
        } else if pair.len() == 3 {
            pair.get(2)
        } else {
            None
        };

        if let Some(Json::Object(branch_obj)) = branch {
            let mut to = Json::Object(std::mem::take(obj));
            merge::merge_json(&mut to, &Json::Object(branch_obj.clone()), MergeMode::Auto);
            *obj = match to {
                Json::Object(m) => m,
                _ => unreachable!("merge of two objects always yields an object"),
            };
            ingest_variables(obj, env)?;
        }
    }

    Ok(())
}

fn parse_jsonc_file(path: &Path) -> Result<Json> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::fs(path, e.to_string()))?;
    let opts = jsonc_parser::ParseOptions::default();
    jsonc_parser::parse_to_serde_value(&text, &opts)
        .map_err(|e| Error::json(path, e.to_string()))?
        .ok_or_else(|| Error::json(path, "empty document"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn local_dependency_graph() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("u.c"), "").unwrap();
        fs::write(dir.path().join("m.c"), "").unwrap();
        let root = write(
            dir.path(),
            "a.gyp",
            r#"{
                "targets": [
                    { "target_name": "util", "type": "static_library", "sources": ["u.c"] },
                    { "target_name": "main", "type": "executable", "sources": ["m.c"], "dependencies": ["util"] }
                ]
            }"#,
        );

        let (_loader, project) = Loader::load_root(&root).unwrap();
        let proj = project.borrow();
        assert_eq!(proj.targets.len(), 2);
        let main = proj.targets.iter().find(|t| t.borrow().name == "main").unwrap();
        assert_eq!(main.borrow().deps.len(), 1);
        assert_eq!(main.borrow().deps[0].borrow().name, "util");
        assert_eq!(main.borrow().sources[0].out.as_deref(), Some("m_0.o"));
    }

    #[test]
    fn cross_project_dependency_dedups() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("l.c"), "").unwrap();
        write(
            dir.path(),
            "a.gyp",
            r#"{
                "targets": [
                    { "target_name": "lib", "type": "static_library", "sources": ["l.c"], "dependencies": ["a.gyp:lib2"] },
                    { "target_name": "lib2", "type": "static_library", "sources": ["l.c"] }
                ]
            }"#,
        );
        let root = write(
            dir.path(),
            "root.gyp",
            r#"{
                "targets": [
                    { "target_name": "t1", "type": "executable", "sources": [], "dependencies": ["a.gyp:lib"] }
                ]
            }"#,
        );

        let (loader, _project) = Loader::load_root(&root).unwrap();
        // root.gyp + a.gyp, loaded once each despite two references to a.gyp.
        assert_eq!(loader.projects().len(), 2);
    }

    #[test]
    fn forbidden_dependency_on_executable_errors() {
        let dir = TempDir::new().unwrap();
        let root = write(
            dir.path(),
            "a.gyp",
            r#"{
                "targets": [
                    { "target_name": "exe", "type": "executable", "sources": [] },
                    { "target_name": "bad", "type": "static_library", "sources": [], "dependencies": ["exe"] }
                ]
            }"#,
        );
        let err = Loader::load_root(&root).unwrap_err();
        assert!(err.to_string().contains("non-linkable") || err.to_string().contains("executable"));
    }

    #[test]
    fn variable_default_is_overridden_by_explicit_value() {
        let dir = TempDir::new().unwrap();
        let root = write(
            dir.path(),
            "a.gyp",
            r#"{
                "variables": { "foo%": "x", "foo": "y" },
                "targets": []
            }"#,
        );
        let (_loader, project) = Loader::load_root(&root).unwrap();
        let env = Rc::clone(&project.borrow().vars);
        assert_eq!(env.borrow().lookup("foo"), Some(VarValue::Str("y".into())));
    }

    #[test]
    fn variable_default_alone_is_kept() {
        let dir = TempDir::new().unwrap();
        let root = write(
            dir.path(),
            "a.gyp",
            r#"{
                "variables": { "foo%": "x" },
                "targets": []
            }"#,
        );
        let (_loader, project) = Loader::load_root(&root).unwrap();
        let env = Rc::clone(&project.borrow().vars);
        assert_eq!(env.borrow().lookup("foo"), Some(VarValue::Str("x".into())));
    }

    #[test]
    fn condition_true_branch_merges_sources() {
        let dir = TempDir::new().unwrap();
        for f in ["base.c", "linux.c", "other.c"] {
            fs::write(dir.path().join(f), "").unwrap();
        }
        let root = write(
            dir.path(),
            "a.gyp",
            r#"{
                "variables": { "OS": "linux" },
                "targets": [
                    {
                        "target_name": "t",
                        "sources": ["base.c"],
                        "conditions": [
                            ["OS == \"linux\"", { "sources": ["linux.c"] }, { "sources": ["other.c"] }]
                        ]
                    }
                ]
            }"#,
        );
        let (_loader, project) = Loader::load_root(&root).unwrap();
        let proj = project.borrow();
        let t = &proj.targets[0];
        let names: Vec<String> = t
            .borrow()
            .sources
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"base.c".to_string()));
        assert!(names.contains(&"linux.c".to_string()));
        assert!(!names.contains(&"other.c".to_string()));
    }

    #[test]
    fn interpolation_resolves_source_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/x.c"), "").unwrap();
        let root = write(
            dir.path(),
            "a.gyp",
            r#"{
                "variables": { "name": "build" },
                "targets": [
                    { "target_name": "t", "sources": ["<(name)/x.c"] }
                ]
            }"#,
        );
        let (_loader, project) = Loader::load_root(&root).unwrap();
        let proj = project.borrow();
        let t = proj.targets[0].borrow();
        assert!(t.sources[0].path.ends_with("build/x.c"));
    }

    #[test]
    fn duplicate_target_name_errors() {
        let dir = TempDir::new().unwrap();
        let root = write(
            dir.path(),
            "a.gyp",
            r#"{
                "targets": [
                    { "target_name": "t", "sources": [] },
                    { "target_name": "t", "sources": [] }
                ]
            }"#,
        );
        assert!(Loader::load_root(&root).is_err());
    }
}
