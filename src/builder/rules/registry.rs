//! Rule registry - static table of BUILD-file symbols.
//!
//! Handlers are keyed by (library, symbol) where the library is the
//! canonical label of a `.bzl` file, or `native` for builtins. Built-in
//! libraries are registered on construction; optional modules are enabled
//! explicitly before any BUILD file is loaded.

use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

use crate::builder::rules::trait_def::Handler;
use crate::builder::rules::{cc, config_setting, genrule, native, rules_proto, skylib};
use crate::starlark::SymbolRef;

/// Library holding the symbols available in every BUILD file.
pub const NATIVE_LIBRARY: &str = "native";

pub const RULES_CC_DEFS: &str = "@rules_cc//cc:defs.bzl";
pub const SKYLIB_COMMON_SETTINGS: &str = "@bazel_skylib//rules:common_settings.bzl";
pub const SKYLIB_WRITE_FILE: &str = "@bazel_skylib//rules:write_file.bzl";

/// Names accepted by [`RuleRegistry::enable_module`].
pub const KNOWN_MODULES: &[&str] = &["rules_proto"];

#[derive(Debug, Error)]
#[error("unknown module `{name}` (known modules: {})", KNOWN_MODULES.join(", "))]
pub struct UnknownModule {
    pub name: String,
}

/// Registry of rule handlers.
#[derive(Default)]
pub struct RuleRegistry {
    handlers: BTreeMap<(String, String), Rc<dyn Handler>>,
}

impl RuleRegistry {
    /// Create a registry with only the built-in libraries.
    pub fn new() -> Self {
        let mut registry = RuleRegistry::default();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        let cc_library: Rc<dyn Handler> = Rc::new(cc::CcLibrary);
        let cc_binary: Rc<dyn Handler> = Rc::new(cc::CcBinary { test: false });
        let cc_test: Rc<dyn Handler> = Rc::new(cc::CcBinary { test: true });
        let noop: Rc<dyn Handler> = Rc::new(native::NoOp);

        for library in [NATIVE_LIBRARY, RULES_CC_DEFS] {
            self.register(library, "cc_library", Rc::clone(&cc_library));
            self.register(library, "cc_binary", Rc::clone(&cc_binary));
            self.register(library, "cc_test", Rc::clone(&cc_test));
        }

        self.register(NATIVE_LIBRARY, "genrule", Rc::new(genrule::Genrule));
        self.register(NATIVE_LIBRARY, "filegroup", Rc::new(native::Filegroup));
        self.register(NATIVE_LIBRARY, "alias", Rc::new(native::Alias));
        self.register(
            NATIVE_LIBRARY,
            "config_setting",
            Rc::new(config_setting::ConfigSetting),
        );
        for symbol in [
            "exports_files",
            "package",
            "licenses",
            "package_group",
            "test_suite",
        ] {
            self.register(NATIVE_LIBRARY, symbol, Rc::clone(&noop));
        }
        self.register(NATIVE_LIBRARY, "glob", Rc::new(native::Glob));
        self.register(NATIVE_LIBRARY, "select", Rc::new(native::Select));
        self.register(NATIVE_LIBRARY, "package_name", Rc::new(native::PackageName));
        self.register(
            NATIVE_LIBRARY,
            "repository_name",
            Rc::new(native::RepositoryName),
        );

        for (symbol, kind) in [
            ("bool_flag", skylib::SettingKind::Bool),
            ("bool_setting", skylib::SettingKind::Bool),
            ("int_flag", skylib::SettingKind::Int),
            ("int_setting", skylib::SettingKind::Int),
            ("string_flag", skylib::SettingKind::String),
            ("string_setting", skylib::SettingKind::String),
        ] {
            self.register(
                SKYLIB_COMMON_SETTINGS,
                symbol,
                Rc::new(skylib::BuildSetting { kind }),
            );
        }
        self.register(SKYLIB_WRITE_FILE, "write_file", Rc::new(skylib::WriteFile));
    }

    /// Register a handler for `symbol` of `library`, replacing any previous one.
    pub fn register(&mut self, library: &str, symbol: &str, handler: Rc<dyn Handler>) {
        self.handlers
            .insert((library.to_string(), symbol.to_string()), handler);
    }

    /// Enable an optional rule module.
    pub fn enable_module(&mut self, name: &str) -> Result<(), UnknownModule> {
        match name {
            "rules_proto" => {
                rules_proto::register(self);
                Ok(())
            }
            _ => Err(UnknownModule {
                name: name.to_string(),
            }),
        }
    }

    pub fn get(&self, symbol: &SymbolRef) -> Option<Rc<dyn Handler>> {
        self.handlers
            .get(&(symbol.library.clone(), symbol.symbol.clone()))
            .cloned()
    }

    pub fn contains(&self, library: &str, symbol: &str) -> bool {
        self.handlers
            .contains_key(&(library.to_string(), symbol.to_string()))
    }

    pub fn has_library(&self, library: &str) -> bool {
        self.handlers.keys().any(|(l, _)| l == library)
    }

    /// Symbols registered for `library`, in name order.
    pub fn symbols<'a>(&'a self, library: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.handlers
            .keys()
            .filter(move |(l, _)| l == library)
            .map(|(_, s)| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
