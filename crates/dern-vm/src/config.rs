use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Resolves a library name given to `require` into Dern source text.
pub type PreLoader = Rc<dyn Fn(&str) -> Option<String>>;

/// Settings fixed when a [`Vm`](crate::Vm) is constructed.
#[derive(Clone)]
pub struct Config {
    /// Log every form with `tracing::debug!` before it is evaluated.
    pub debug_mode_on: bool,
    /// Kept for hosts that load native plugins themselves; the VM only
    /// records it.
    pub no_dl_close: bool,
    /// Directories searched by `require`, in order, before the current one.
    pub include_directories: Vec<PathBuf>,
    /// When false, builtins that touch the file system fail.
    pub file_system_access_allowed: bool,
    /// Consulted by `require` before any directory lookup.
    pub pre_loader_for_require_src: Option<PreLoader>,
    /// Allocations between two automatic collections.
    pub gc_trigger_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug_mode_on: false,
            no_dl_close: false,
            include_directories: Vec::new(),
            file_system_access_allowed: true,
            pre_loader_for_require_src: None,
            gc_trigger_limit: 1024,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("debug_mode_on", &self.debug_mode_on)
            .field("no_dl_close", &self.no_dl_close)
            .field("include_directories", &self.include_directories)
            .field("file_system_access_allowed", &self.file_system_access_allowed)
            .field(
                "pre_loader_for_require_src",
                &self.pre_loader_for_require_src.is_some(),
            )
            .field("gc_trigger_limit", &self.gc_trigger_limit)
            .finish()
    }
}
