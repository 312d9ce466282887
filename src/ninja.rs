//! Ninja manifest generation (§4.6). The reference generator is only a
//! `build name: phony` stub dispatched through a `target_cb` function
//! pointer; the real rule/build-line layout here is new, following that
//! stub's "one callback per target, write into a shared buffer" shape.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buf::Buf;
use crate::buf_put;
use crate::error::Result;
use crate::pathutil;
use crate::project::{Loader, Project, SourceCategory, Target, TargetKind};
use crate::settings::Settings;

pub fn generate(loader: &Loader, settings: &Settings) -> Result<String> {
    let mut buf = Buf::new();
    write_prologue(&mut buf);

    for project in loader.projects() {
        let proj = project.borrow();
        let target_count = proj.targets.len();
        drop(proj);
        for idx in 0..target_count {
            let target = Rc::clone(&project.borrow().targets[idx]);
            write_target(&mut buf, project, &target, settings)?;
        }
    }

    Ok(buf.into_string())
}

fn write_prologue(buf: &mut Buf) {
    buf_put!(buf, "# generated by pyg-ninja; do not edit.\n\n");
    buf_put!(
        buf,
        "rule cc\n  command = cc -MMD -MF $out.d $cflags $inc $def -c $in -o $out\n  depfile = $out.d\n  deps = gcc\n\n"
    );
    buf_put!(
        buf,
        "rule cxx\n  command = c++ -MMD -MF $out.d $cflags $inc $def -c $in -o $out\n  depfile = $out.d\n  deps = gcc\n\n"
    );
    buf_put!(buf, "rule ld\n  command = cc $ldflags -o $out $in $lib\n\n");
    buf_put!(buf, "rule ldxx\n  command = c++ $ldflags -o $out $in $lib\n\n");
    buf_put!(buf, "rule ar\n  command = ar rcs $out $in\n\n");
    buf_put!(
        buf,
        "rule solink\n  command = cc -shared $ldflags -o $out $in $lib\n\n"
    );
    buf_put!(
        buf,
        "rule soldxx\n  command = c++ -shared $ldflags -o $out $in $lib\n\n"
    );
    buf_put!(buf, "rule copy\n  command = cp $in $out\n\n");
}

fn target_out_dir(settings: &Settings, project_id: u32, target_name: &str) -> std::path::PathBuf {
    settings
        .builddir
        .join(project_id.to_string())
        .join(target_name)
}

fn write_target(
    buf: &mut Buf,
    project: &Rc<RefCell<Project>>,
    target: &Target,
    settings: &Settings,
) -> Result<()> {
    let proj = project.borrow();
    let project_id = proj.id;
    let out_dir = target_out_dir(settings, project_id, &target.name);

    let inc_var = format!("inc_{}_{}", target.name, project_id);
    let def_var = format!("def_{}_{}", target.name, project_id);
    let lib_var = format!("lib_{}_{}", target.name, project_id);
    let cflags_var = format!("cflags_{}_{}", target.name, project_id);
    let ldflags_var = format!("ldflags_{}_{}", target.name, project_id);

    let inc_value = target
        .include_dirs
        .iter()
        .map(|p| format!("-I{}", pathutil::deprefix(p, &settings.deprefix).display()))
        .collect::<Vec<_>>()
        .join(" ");
    let def_value = target
        .defines
        .iter()
        .map(|d| format!("-D{d}"))
        .collect::<Vec<_>>()
        .join(" ");
    let lib_value = target.libs.join(" ");

    buf_put!(buf, "{} = {}\n", inc_var, inc_value);
    buf_put!(buf, "{} = {}\n", def_var, def_value);
    buf_put!(buf, "{} = {}\n", lib_var, lib_value);
    buf_put!(buf, "{} = {}\n", cflags_var, target.cflags);
    buf_put!(buf, "{} = {}\n\n", ldflags_var, target.ldflags);

    let mut objects = Vec::new();
    for source in &target.sources {
        if !source.category.is_compilable() {
            continue;
        }
        let out = source
            .out
            .as_ref()
            .expect("compilable sources always carry an output name");
        let out_path = out_dir.join(out);
        let rule = if source.category.is_cxx_like() { "cxx" } else { "cc" };
        let src_display = pathutil::deprefix(&source.path, &settings.deprefix);

        buf_put!(
            buf,
            "build {}: {} {}\n  cflags = ${cflags_var}\n  inc = ${inc_var}\n  def = ${def_var}\n\n",
            out_path.display(),
            rule,
            src_display.display(),
        );

        objects.push(out_path);
    }

    let dep_outputs: Vec<_> = target
        .deps
        .iter()
        .map(|dep| {
            let dep = dep.borrow();
            let dep_project_id = dep
                .project
                .upgrade()
                .map(|p| p.borrow().id)
                .unwrap_or(project_id);
            target_out_dir(settings, dep_project_id, &dep.name).join(format!(
                "{}{}",
                dep.name,
                dep.kind.extension()
            ))
        })
        .collect();

    let linked_output = out_dir.join(format!("{}{}", target.name, target.kind.extension()));

    if target.kind == TargetKind::None || objects.is_empty() {
        buf_put!(buf, "build {}: phony", linked_output.display());
        for dep_out in &dep_outputs {
            buf_put!(buf, " {}", dep_out.display());
        }
        buf_put!(buf, "\n\n");
    } else {
        let has_cxx = target.source_types
            & (crate::project::source_flags::CXX | crate::project::source_flags::OBJCXX)
            != 0;

        let rule = match (target.kind, has_cxx) {
            (TargetKind::StaticLibrary, _) => "ar",
            (TargetKind::SharedLibrary, true) => "soldxx",
            (TargetKind::SharedLibrary, false) => "solink",
            (TargetKind::Executable, true) => "ldxx",
            (TargetKind::Executable, false) => "ld",
            (TargetKind::None, _) => unreachable!("None targets take the phony branch above"),
        };

        buf_put!(buf, "build {}: {}", linked_output.display(), rule);
        for obj in &objects {
            buf_put!(buf, " {}", obj.display());
        }
        if !dep_outputs.is_empty() {
            buf_put!(buf, " |");
            for dep_out in &dep_outputs {
                buf_put!(buf, " {}", dep_out.display());
            }
        }
        buf_put!(
            buf,
            "\n  lib = ${lib_var}\n  ldflags = ${ldflags_var}\n\n"
        );
    }

    if project_id == 0 {
        let copied = settings
            .builddir
            .join(format!("{}{}", target.name, target.kind.extension()));
        buf_put!(
            buf,
            "build {}: copy {}\n\n",
            copied.display(),
            linked_output.display()
        );
        buf_put!(buf, "build {}: phony {}\n\n", target.name, copied.display());
    }

    Ok(())
}
