//! Loading plugin modules from disk and resolving their exported types.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::config::PluginsConfig;
use crate::declaration::{
    DECLARATION_SYMBOL, PLUGKIT_ABI_VERSION, PLUGKIT_VERSION, PluginDeclaration,
};
use crate::registry::{ParamKind, RegistrationError, TypeDescriptor, TypeKind, TypeRegistrar};

#[derive(Debug, thiserror::Error)]
pub enum ModuleLoadError {
    #[error("module file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to open module {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("module {} does not export a plugin declaration ({symbol})", .path.display())]
    MissingDeclaration { path: PathBuf, symbol: String },

    #[error("module {} has ABI version {module}, host expects {host}", .path.display())]
    IncompatibleAbi { path: PathBuf, module: u32, host: u32 },

    #[error(
        "module {} was built against plugkit {module}, host runs plugkit {host}",
        .path.display()
    )]
    IncompatibleToolchain {
        path: PathBuf,
        module: String,
        host: String,
    },

    #[error("module {} exports an invalid type table", .path.display())]
    Registration {
        path: PathBuf,
        #[source]
        source: RegistrationError,
    },
}

/// Opens plugin modules. Relative paths that don't exist as given are looked up in
/// the configured search directory.
#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    search_dir: Option<PathBuf>,
}

impl ModuleLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_search_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dir: Some(dir.into()),
        }
    }

    #[must_use]
    pub fn from_config(cfg: &PluginsConfig) -> Self {
        Self {
            search_dir: cfg.search_dir.clone(),
        }
    }

    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        match &self.search_dir {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Map the library at `path` and read its type table.
    ///
    /// Either everything succeeds and a [`LoadedModule`] is returned, or the library is
    /// closed again before the error is returned.
    ///
    /// # Errors
    /// See [`ModuleLoadError`].
    #[allow(unsafe_code)]
    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedModule, ModuleLoadError> {
        let path = self.resolve_path(path.as_ref());
        if !path.is_file() {
            return Err(ModuleLoadError::NotFound { path });
        }

        tracing::debug!(path = %path.display(), "opening module");
        // SAFETY: loading a library runs its initializers. Modules are trusted code built
        // by the same toolchain as the host.
        let library = match unsafe { Library::new(&path) } {
            Ok(lib) => lib,
            Err(source) => return Err(ModuleLoadError::Open { path, source }),
        };

        let declaration = {
            // SAFETY: the symbol is a `PluginDeclaration` static exported by
            // `declare_plugin_module!`; it stays valid while `library` is open.
            let symbol: Symbol<'_, *const PluginDeclaration> =
                match unsafe { library.get(DECLARATION_SYMBOL) } {
                    Ok(sym) => sym,
                    Err(_) => {
                        return Err(ModuleLoadError::MissingDeclaration {
                            path,
                            symbol: String::from_utf8_lossy(
                                &DECLARATION_SYMBOL[..DECLARATION_SYMBOL.len() - 1],
                            )
                            .into_owned(),
                        });
                    }
                };
            let ptr: *const PluginDeclaration = *symbol;

            // `abi_version` is the first field of a `repr(C)` struct, so it can be read
            // before the rest of the layout is trusted.
            // SAFETY: `ptr` points to a live static inside `library`.
            let abi_version = unsafe { (*ptr).abi_version };
            if abi_version != PLUGKIT_ABI_VERSION {
                return Err(ModuleLoadError::IncompatibleAbi {
                    path,
                    module: abi_version,
                    host: PLUGKIT_ABI_VERSION,
                });
            }
            // SAFETY: ABI version matches, so the layout is the one this crate defines.
            unsafe { *ptr }
        };

        LoadedModule::build(path, &declaration, Some(library))
    }
}

/// A plugin module mapped into the process.
///
/// The library stays loaded for as long as this value lives. Descriptors, resolved
/// types and plugin instances borrow from it and cannot outlive it.
pub struct LoadedModule {
    path: PathBuf,
    name: String,
    version: String,
    types: Vec<TypeDescriptor>,
    // Declared last so it is dropped last: `types` points into the library.
    library: Option<Library>,
}

impl LoadedModule {
    /// Build a module from a declaration that is linked into the current process.
    ///
    /// Runs the same version checks and registration as [`ModuleLoader::load`] without
    /// opening a library. Used for statically linked modules and in tests.
    ///
    /// # Errors
    /// See [`ModuleLoadError`].
    pub fn from_declaration(
        path: impl Into<PathBuf>,
        declaration: &PluginDeclaration,
    ) -> Result<Self, ModuleLoadError> {
        let path = path.into();
        if declaration.abi_version != PLUGKIT_ABI_VERSION {
            return Err(ModuleLoadError::IncompatibleAbi {
                path,
                module: declaration.abi_version,
                host: PLUGKIT_ABI_VERSION,
            });
        }
        Self::build(path, declaration, None)
    }

    fn build(
        path: PathBuf,
        declaration: &PluginDeclaration,
        library: Option<Library>,
    ) -> Result<Self, ModuleLoadError> {
        if declaration.plugkit_version != PLUGKIT_VERSION {
            return Err(ModuleLoadError::IncompatibleToolchain {
                path,
                module: declaration.plugkit_version.to_owned(),
                host: PLUGKIT_VERSION.to_owned(),
            });
        }

        if library.is_some() {
            tracing::dispatcher::get_default(|dispatch| (declaration.install_dispatch)(dispatch));
        }

        let mut registrar = TypeRegistrar::new();
        let types = match declaration.register_types(&mut registrar) {
            Ok(()) => registrar.finish(),
            Err(message) => Err(RegistrationError::Panicked { message }),
        };
        let types = match types {
            Ok(types) => types,
            Err(source) => return Err(ModuleLoadError::Registration { path, source }),
        };

        let module = Self {
            name: declaration.module_name.to_owned(),
            version: declaration.module_version.to_owned(),
            types,
            library,
            path,
        };
        tracing::info!(
            path = %module.path.display(),
            module = %module.name,
            version = %module.version,
            types = module.types.len(),
            dynamic = module.is_dynamic(),
            "module loaded"
        );
        Ok(module)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Keep the module mapped until the process exits.
    ///
    /// Modules are never unloaded individually; the host calls this right after loading
    /// so nothing created from the module can outlive its code.
    #[must_use]
    pub fn into_resident(self) -> &'static Self {
        Box::leak(Box::new(self))
    }

    /// True when backed by a library opened from disk.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }

    /// Names of all exported types, in registration order.
    #[must_use]
    pub fn exported_types(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name).collect()
    }

    /// Look up an exported type by its fully-qualified name.
    ///
    /// Pure table lookup; no module code runs. `None` means the module does not
    /// export that name.
    #[must_use]
    pub fn resolve(&self, type_name: &str) -> Option<ResolvedType<'_>> {
        self.types
            .iter()
            .find(|t| t.name == type_name)
            .map(|descriptor| ResolvedType {
                module: self,
                descriptor,
            })
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("types", &self.exported_types())
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}

/// An exported type, borrowed from the module that defines it.
#[derive(Clone, Copy)]
pub struct ResolvedType<'m> {
    module: &'m LoadedModule,
    descriptor: &'m TypeDescriptor,
}

impl<'m> ResolvedType<'m> {
    #[must_use]
    pub fn name(&self) -> &'m str {
        self.descriptor.name
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.descriptor.kind
    }

    #[must_use]
    pub fn module(&self) -> &'m LoadedModule {
        self.module
    }

    /// Declared constructor parameters, `None` for abstract types.
    #[must_use]
    pub fn constructor_params(&self) -> Option<&'m [ParamKind]> {
        self.descriptor.constructor.map(|c| c.params)
    }

    pub(crate) fn descriptor(&self) -> &'m TypeDescriptor {
        self.descriptor
    }
}

impl std::fmt::Debug for ResolvedType<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedType")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("module", &self.module.name())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::contracts::Plugin;
    use crate::registry::{Constructor, ConstructorArgs};
    use std::io::Write;

    struct Nop;
    impl Plugin for Nop {
        fn run(&mut self) -> anyhow::Result<i32> {
            Ok(0)
        }
    }

    fn make(_: &ConstructorArgs) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(Nop))
    }

    fn register_two(reg: &mut TypeRegistrar) {
        reg.register(TypeDescriptor::concrete(
            "test_mod::Nop",
            Constructor::new(&[ParamKind::ServiceProvider], make),
        ))
        .register(TypeDescriptor::abstract_type("test_mod::Base"));
    }

    fn register_dup(reg: &mut TypeRegistrar) {
        reg.register(TypeDescriptor::abstract_type("x"))
            .register(TypeDescriptor::abstract_type("x"));
    }

    fn register_panics(_: &mut TypeRegistrar) {
        panic!("boom during registration");
    }

    fn decl(register: fn(&mut TypeRegistrar)) -> PluginDeclaration {
        PluginDeclaration::new("test_mod", "0.0.1", register)
    }

    #[test]
    fn resolve_finds_exported_types_and_returns_none_otherwise() {
        let module = LoadedModule::from_declaration("in-process", &decl(register_two)).unwrap();
        assert_eq!(module.name(), "test_mod");
        assert_eq!(module.version(), "0.0.1");
        assert!(!module.is_dynamic());
        assert_eq!(module.exported_types(), ["test_mod::Nop", "test_mod::Base"]);

        let ty = module.resolve("test_mod::Nop").unwrap();
        assert_eq!(ty.name(), "test_mod::Nop");
        assert_eq!(ty.kind(), TypeKind::Concrete);
        assert_eq!(ty.constructor_params(), Some(&[ParamKind::ServiceProvider][..]));

        assert!(module.resolve("test_mod::Missing").is_none());
        assert!(module.resolve("Nop").is_none(), "names are fully qualified");
    }

    #[test]
    fn resident_module_keeps_serving_lookups() {
        let module: &'static LoadedModule =
            LoadedModule::from_declaration("in-process", &decl(register_two))
                .unwrap()
                .into_resident();
        assert_eq!(module.resolve("test_mod::Base").unwrap().kind(), TypeKind::Abstract);
    }

    #[test]
    fn abi_mismatch_is_rejected() {
        let mut d = decl(register_two);
        d.abi_version = PLUGKIT_ABI_VERSION + 1;
        match LoadedModule::from_declaration("m", &d) {
            Err(ModuleLoadError::IncompatibleAbi { module, host, .. }) => {
                assert_eq!(module, PLUGKIT_ABI_VERSION + 1);
                assert_eq!(host, PLUGKIT_ABI_VERSION);
            }
            other => panic!("expected IncompatibleAbi, got {other:?}"),
        }
    }

    #[test]
    fn plugkit_version_mismatch_is_rejected() {
        let mut d = decl(register_two);
        d.plugkit_version = "0.0.0-elsewhere";
        let err = LoadedModule::from_declaration("m", &d).unwrap_err();
        assert!(matches!(err, ModuleLoadError::IncompatibleToolchain { .. }));
        assert!(err.to_string().contains("0.0.0-elsewhere"));
    }

    #[test]
    fn invalid_type_table_is_rejected() {
        let err = LoadedModule::from_declaration("m", &decl(register_dup)).unwrap_err();
        assert!(matches!(
            err,
            ModuleLoadError::Registration {
                source: RegistrationError::DuplicateType { .. },
                ..
            }
        ));
    }

    #[test]
    fn panicking_registration_is_reported() {
        let err = LoadedModule::from_declaration("m", &decl(register_panics)).unwrap_err();
        match err {
            ModuleLoadError::Registration {
                source: RegistrationError::Panicked { message },
                ..
            } => assert!(message.contains("boom during registration")),
            other => panic!("expected Registration/Panicked, got {other:?}"),
        }
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("libnothing.so");
        match ModuleLoader::new().load(&missing) {
            Err(ModuleLoadError::NotFound { path }) => assert_eq!(path, missing),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn load_garbage_file_fails_to_open() {
        let mut file = tempfile::Builder::new()
            .suffix(".so")
            .tempfile()
            .unwrap();
        file.write_all(b"definitely not a shared object").unwrap();
        file.flush().unwrap();

        match ModuleLoader::new().load(file.path()) {
            Err(ModuleLoadError::Open { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected Open error, got {other:?}"),
        }
    }

    /// A shared library already mapped into the test process (libc, libgcc_s, ...).
    #[cfg(target_os = "linux")]
    fn mapped_system_library() -> PathBuf {
        let maps = std::fs::read_to_string("/proc/self/maps").unwrap();
        maps.lines()
            .filter_map(|line| line.split_whitespace().nth(5))
            .map(PathBuf::from)
            .find(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.contains(".so"))
            })
            .expect("the test process maps at least one shared library")
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn real_library_without_declaration_is_rejected() {
        let library = mapped_system_library();
        match ModuleLoader::new().load(&library) {
            Err(ModuleLoadError::MissingDeclaration { path, symbol }) => {
                assert_eq!(path, library);
                assert_eq!(symbol, "PLUGKIT_PLUGIN_DECLARATION");
            }
            other => panic!("expected MissingDeclaration for {}, got {other:?}", library.display()),
        }
    }

    #[test]
    fn relative_paths_resolve_against_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ModuleLoader::with_search_dir(dir.path());

        let resolved = loader.resolve_path(Path::new("libplugin_that_is_not_here.so"));
        assert_eq!(resolved, dir.path().join("libplugin_that_is_not_here.so"));

        let absolute = dir.path().join("abs.so");
        assert_eq!(loader.resolve_path(&absolute), absolute);

        match loader.load("libplugin_that_is_not_here.so") {
            Err(ModuleLoadError::NotFound { path }) => {
                assert_eq!(path, dir.path().join("libplugin_that_is_not_here.so"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
