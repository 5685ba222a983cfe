//! Library version.

pub const MAJOR: u32 = 0;
pub const MINOR: u32 = 1;
pub const PATCH: u32 = 0;

/// Empty for releases.
pub const PRERELEASE: &str = "";

/// `0xMMmmpp`.
pub const fn version_hex() -> u32 {
    (MAJOR << 16) | (MINOR << 8) | PATCH
}

pub fn version_string() -> String {
    if PRERELEASE.is_empty() {
        format!("{}.{}.{}", MAJOR, MINOR, PATCH)
    } else {
        format!("{}.{}.{}-{}", MAJOR, MINOR, PATCH, PRERELEASE)
    }
}
