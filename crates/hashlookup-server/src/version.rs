//! Build metadata embedded by `build.rs`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git commit SHA, `unknown` outside a checkout
pub const GIT_SHA: &str = env!("VERGEN_GIT_SHA");

pub const GIT_DIRTY: &str = env!("VERGEN_GIT_DIRTY");

pub const RUSTC_VERSION: &str = env!("VERGEN_RUSTC_SEMVER");

pub const BUILD_TIMESTAMP: &str = env!("VERGEN_BUILD_TIMESTAMP");

pub const TARGET: &str = env!("VERGEN_CARGO_TARGET_TRIPLE");

/// Protocol version announced over identify. Nodes only differ in patch
/// releases when this string matches.
pub const PROTOCOL_VERSION: &str = concat!("/hashlookup/", env!("CARGO_PKG_VERSION"));

/// Agent version announced over identify: `hashlookup-server/<version>+<sha>`.
pub fn agent_version() -> String {
    format!("hashlookup-server/{VERSION}+{GIT_SHA}")
}

/// `<version> (<sha>[ dirty])`, used by `--version`.
pub fn full_version() -> String {
    let dirty = if GIT_DIRTY == "true" { " dirty" } else { "" };
    format!("{VERSION} ({GIT_SHA}{dirty})")
}

/// Multi-line build report logged at startup.
pub fn build_info() -> String {
    format!(
        "hashlookup-server {}\n\
         commit: {}\n\
         built:  {}\n\
         rustc:  {}\n\
         target: {}",
        full_version(),
        GIT_SHA,
        BUILD_TIMESTAMP,
        RUSTC_VERSION,
        TARGET
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_prefix() {
        assert!(PROTOCOL_VERSION.starts_with("/hashlookup/"));
        assert!(agent_version().starts_with("hashlookup-server/"));
    }
}
