//! `cc_library`, `cc_binary` and `cc_test`.

use std::path::Path;

use crate::builder::context::AnalysisContext;
use crate::builder::error::AnalysisError;
use crate::builder::evaluation::RuleDecl;
use crate::builder::rules::trait_def::Handler;
use crate::builder::substitution::{
    apply_location_substitutions, apply_make_variable_substitutions, generate_substitutions,
};
use crate::core::cmake_target::{CMakeTarget, CMakeTargetPair};
use crate::core::provider::{Provider, TargetInfo};
use crate::util::fs::to_posix;
use crate::util::quote::{quote_list, quote_path, quote_string};

const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "C", "S", "s", "asm"];

const LIST_SEPARATOR: &str = "\n        ";

fn is_source_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| SOURCE_EXTENSIONS.contains(&e))
}

/// Attributes shared by every C++ rule, after substitution.
struct CcCommon {
    pair: CMakeTargetPair,
    srcs: Vec<String>,
    hdrs: Vec<String>,
    link_libraries: Vec<CMakeTarget>,
    add_dependencies: Vec<CMakeTarget>,
    include_dirs: Vec<String>,
    defines: Vec<String>,
    local_defines: Vec<String>,
    copts: Vec<String>,
    linkopts: Vec<String>,
}

impl CcCommon {
    fn collect(ctx: &mut AnalysisContext<'_>, rule: &RuleDecl) -> Result<Self, AnalysisError> {
        let target = ctx.target().clone();
        let pair = ctx.generate_cmake_target_pair(&target);

        let mut add_dependencies = Vec::new();
        let src_labels = ctx.attr_labels(rule, "srcs")?;
        let srcs = ctx.collect_files(&src_labels, &mut add_dependencies)?;
        let mut hdr_labels = ctx.attr_labels(rule, "hdrs")?;
        hdr_labels.extend(ctx.attr_labels(rule, "textual_hdrs")?);
        let hdrs = ctx.collect_files(&hdr_labels, &mut add_dependencies)?;

        let mut link_libraries = Vec::new();
        for dep in ctx.attr_labels(rule, "deps")? {
            if ctx.is_ignored_library(&dep) {
                tracing::debug!("{}: ignoring library {}", target, dep);
                continue;
            }
            let info = if ctx.is_first_party(&dep) {
                Some(ctx.get_target_info(&dep)?)
            } else {
                ctx.get_optional_target_info(&dep)?
            };
            let library = match &info {
                Some(info) => {
                    for d in info.cmake_deps() {
                        if !add_dependencies.contains(d) {
                            add_dependencies.push(d.clone());
                        }
                    }
                    info.link_libraries().cloned()
                }
                None => Some(ctx.generate_cmake_target_pair(&dep).dep().clone()),
            };
            if let Some(library) = library {
                if !link_libraries.contains(&library) {
                    link_libraries.push(library);
                }
            }
        }

        let toolchains = ctx.attr_labels(rule, "toolchains")?;
        let substitutions = generate_substitutions(ctx, &target, &[], &[]);
        let mut defines = Vec::new();
        for define in ctx.attr_string_list(rule, "defines")? {
            defines.push(apply_make_variable_substitutions(
                ctx,
                &define,
                &substitutions,
                &toolchains,
            )?);
        }
        let mut local_defines = Vec::new();
        for define in ctx.attr_string_list(rule, "local_defines")? {
            local_defines.push(apply_make_variable_substitutions(
                ctx,
                &define,
                &substitutions,
                &toolchains,
            )?);
        }

        let source_directory = ctx.source_directory();
        let mut copts = Vec::new();
        for copt in ctx.attr_string_list(rule, "copts")? {
            copts.push(apply_location_substitutions(
                ctx,
                &copt,
                Some(source_directory.as_path()),
                &mut add_dependencies,
            )?);
        }
        let mut linkopts = Vec::new();
        for linkopt in ctx.attr_string_list(rule, "linkopts")? {
            linkopts.push(apply_location_substitutions(
                ctx,
                &linkopt,
                Some(source_directory.as_path()),
                &mut add_dependencies,
            )?);
        }

        let mut include_dirs = vec![
            "${PROJECT_SOURCE_DIR}".to_string(),
            "${PROJECT_BINARY_DIR}".to_string(),
        ];
        let package_source_dir = ctx.source_package_dir();
        let package_binary_dir = ctx.binary_package_dir();
        for include in ctx.attr_string_list(rule, "includes")? {
            include_dirs.push(to_posix(&package_source_dir.join(&include)));
            include_dirs.push(to_posix(&package_binary_dir.join(&include)));
        }

        Ok(CcCommon {
            pair,
            srcs,
            hdrs,
            link_libraries,
            add_dependencies,
            include_dirs,
            defines,
            local_defines,
            copts,
            linkopts,
        })
    }

    fn has_sources(&self) -> bool {
        self.srcs.iter().any(|s| is_source_file(s))
    }

    /// Emit everything after `add_library` / `add_executable`.
    fn emit_properties(&self, out: &mut String, interface: bool) {
        let name = &self.pair.target;
        let public = if interface { "INTERFACE" } else { "PUBLIC" };

        if !interface {
            let sources: Vec<&String> = self.srcs.iter().chain(self.hdrs.iter()).collect();
            if !sources.is_empty() {
                out.push_str(&format!(
                    "target_sources({} PRIVATE{}{})\n",
                    name,
                    LIST_SEPARATOR,
                    quote_list(sources, LIST_SEPARATOR)
                ));
            }
        }
        if !self.link_libraries.is_empty() {
            out.push_str(&format!(
                "target_link_libraries({} {}{}{})\n",
                name,
                public,
                LIST_SEPARATOR,
                quote_list(self.link_libraries.iter().map(CMakeTarget::as_str), LIST_SEPARATOR)
            ));
        }
        out.push_str(&format!(
            "target_include_directories({} {}{}{})\n",
            name,
            public,
            LIST_SEPARATOR,
            quote_list(&self.include_dirs, LIST_SEPARATOR)
        ));
        if !self.defines.is_empty() {
            out.push_str(&format!(
                "target_compile_definitions({} {}{}{})\n",
                name,
                public,
                LIST_SEPARATOR,
                quote_list(&self.defines, LIST_SEPARATOR)
            ));
        }
        if !interface && !self.local_defines.is_empty() {
            out.push_str(&format!(
                "target_compile_definitions({} PRIVATE{}{})\n",
                name,
                LIST_SEPARATOR,
                quote_list(&self.local_defines, LIST_SEPARATOR)
            ));
        }
        if !interface && !self.copts.is_empty() {
            out.push_str(&format!(
                "target_compile_options({} PRIVATE{}{})\n",
                name,
                LIST_SEPARATOR,
                quote_list(&self.copts, LIST_SEPARATOR)
            ));
        }
        if !self.linkopts.is_empty() {
            out.push_str(&format!(
                "target_link_options({} {}{}{})\n",
                name,
                public,
                LIST_SEPARATOR,
                quote_list(&self.linkopts, LIST_SEPARATOR)
            ));
        }
        if !self.add_dependencies.is_empty() {
            out.push_str(&format!(
                "add_dependencies({} {})\n",
                name,
                self.add_dependencies
                    .iter()
                    .map(CMakeTarget::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
            ));
        }
    }
}

/// `cc_library`
pub struct CcLibrary;

impl Handler for CcLibrary {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let common = CcCommon::collect(ctx, rule)?;
        let interface = !common.has_sources();
        let name = &common.pair.target;

        let mut out = format!("\n# {}\n", ctx.target());
        if interface {
            out.push_str(&format!("add_library({} INTERFACE)\n", name));
        } else {
            out.push_str(&format!("add_library({})\n", name));
            out.push_str(&format!(
                "set_property(TARGET {} PROPERTY LINKER_LANGUAGE \"CXX\")\n",
                name
            ));
        }
        common.emit_properties(&mut out, interface);
        if interface && !common.hdrs.is_empty() {
            out.push_str(&format!(
                "target_sources({} INTERFACE{}{})\n",
                name,
                LIST_SEPARATOR,
                quote_list(&common.hdrs, LIST_SEPARATOR)
            ));
        }
        if let Some(alias) = &common.pair.alias {
            out.push_str(&format!("add_library({} ALIAS {})\n", alias, name));
        }
        ctx.emit(out);

        let mut info = TargetInfo::new([Provider::CMakeLinkLibraries {
            target: common.pair.dep().clone(),
        }]);
        if !common.add_dependencies.is_empty() {
            info = info.with(Provider::CMakeDeps {
                targets: common.add_dependencies,
            });
        }
        Ok(info)
    }
}

/// `cc_binary`, or `cc_test` when `test` is set.
pub struct CcBinary {
    pub test: bool,
}

impl Handler for CcBinary {
    fn analyze(
        &self,
        ctx: &mut AnalysisContext<'_>,
        rule: &RuleDecl,
    ) -> Result<TargetInfo, AnalysisError> {
        let common = CcCommon::collect(ctx, rule)?;
        let name = &common.pair.target;

        let mut out = format!("\n# {}\n", ctx.target());
        out.push_str(&format!("add_executable({})\n", name));
        out.push_str(&format!(
            "set_property(TARGET {} PROPERTY LINKER_LANGUAGE \"CXX\")\n",
            name
        ));
        common.emit_properties(&mut out, false);
        if self.test {
            let args = ctx.attr_string_list(rule, "args")?;
            let mut command = vec![quote_string(name.as_str())];
            command.extend(args.iter().map(|a| quote_string(a)));
            out.push_str(&format!(
                "add_test(NAME {} COMMAND {} WORKING_DIRECTORY {})\n",
                name,
                command.join(" "),
                quote_path(&ctx.source_directory())
            ));
        }
        ctx.emit(out);

        Ok(TargetInfo::new([Provider::CMakeExecutableTarget {
            target: name.clone(),
        }]))
    }
}

#[cfg(test)]
mod tests {
    use crate::core::label::TargetId;
    use crate::test_support::TestRepo;

    #[test]
    fn test_cc_library_emission() {
        let mut repo = TestRepo::new();
        repo.ignore_library("@repo//third_party:ignored");
        let state = repo.load(
            "pkg",
            r#"
cc_library(
    name = "util",
    srcs = ["util.cc"],
    hdrs = ["util.h"],
    deps = [":headers", "@dep//:core", "//third_party:ignored"],
    defines = ["USE_UTIL=1"],
    copts = ["-Wall"],
)
cc_library(name = "headers", hdrs = ["headers.h"])
"#,
        );
        let info = state
            .get_target_info(&TargetId::parse("@repo//pkg:util").unwrap())
            .unwrap();
        assert!(state.errors().is_empty(), "{:?}", state.errors());
        assert_eq!(info.link_libraries().unwrap().as_str(), "Repo::pkg_util");

        let text = state.builder().as_text();
        assert!(text.contains("add_library(Repo_pkg_headers INTERFACE)"));
        assert!(text.contains("add_library(Repo_pkg_util)"));
        assert!(text.contains("\"/src/repo/pkg/util.cc\""));
        assert!(text.contains("\"Repo::pkg_headers\""));
        assert!(text.contains("\"Dep::core\""));
        assert!(!text.contains("ignored"));
        assert!(text.contains("\"USE_UTIL=1\""));
        assert!(text.contains("target_compile_options(Repo_pkg_util PRIVATE"));
        assert!(text.contains("add_library(Repo::pkg_util ALIAS Repo_pkg_util)"));

        // The header-only dependency is emitted first.
        let headers = text.find("add_library(Repo_pkg_headers").unwrap();
        let util = text.find("add_library(Repo_pkg_util)").unwrap();
        assert!(headers < util);
    }

    #[test]
    fn test_cc_test_emission() {
        let mut repo = TestRepo::new();
        let state = repo.load(
            "pkg",
            "cc_test(name = \"util_test\", srcs = [\"util_test.cc\"], args = [\"--fast\"])\n",
        );
        let info = state
            .get_target_info(&TargetId::parse("@repo//pkg:util_test").unwrap())
            .unwrap();
        assert_eq!(
            info.executable_target().unwrap().as_str(),
            "Repo_pkg_util_test"
        );
        let text = state.builder().as_text();
        assert!(text.contains("add_executable(Repo_pkg_util_test)"));
        assert!(text.contains(
            "add_test(NAME Repo_pkg_util_test COMMAND \"Repo_pkg_util_test\" \"--fast\""
        ));
    }

    #[test]
    fn test_missing_first_party_dep_fails() {
        let mut repo = TestRepo::new();
        let state = repo.load("pkg", "cc_library(name = \"a\", deps = [\":nope\"])\n");
        state.analyze(&[TargetId::parse("@repo//pkg:a").unwrap()]);
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.errors()[0].target.target_name, "a");
    }
}
