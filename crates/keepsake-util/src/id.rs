//! Entry identifiers and history folder names.
//!
//! Every tracked resource gets a folder named after a hash of its identity
//! string. Inside it, each entry's snapshot is stored under a short random
//! token followed by the resource's extension, e.g. `aB3x.rs`.

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::OnceLock;

/// Number of random characters in an entry id.
pub const ENTRY_ID_LEN: usize = 4;

/// Name of the listing file inside each history folder.
pub const LISTING_FILE: &str = "entries.json";

/// Matches snapshot file names: four alphanumerics and an optional extension.
static ENTRY_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn entry_name_regex() -> &'static Regex {
    ENTRY_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]{4}(\.[^/\\]+)?$")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Generate a fresh entry id carrying `extension` (including its dot).
pub fn entry_id(extension: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ENTRY_ID_LEN)
        .map(char::from)
        .collect();
    format!("{token}{extension}")
}

/// Whether a file found in a history folder holds an entry snapshot.
///
/// The listing file and the store's dot-prefixed temp files never do.
pub fn is_entry_file_name(name: &str) -> bool {
    name != LISTING_FILE && entry_name_regex().is_match(name)
}

/// History folder name for a resource identity string.
///
/// Lowercase hex of the first eight bytes of its SHA-256 digest.
pub fn folder_name(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    digest[..8].iter().fold(String::with_capacity(16), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_shape() {
        let id = entry_id(".txt");
        assert_eq!(id.len(), ENTRY_ID_LEN + 4);
        assert!(id.ends_with(".txt"));
        assert!(id[..ENTRY_ID_LEN].chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(is_entry_file_name(&id));
    }

    #[test]
    fn test_entry_id_without_extension() {
        let id = entry_id("");
        assert_eq!(id.len(), ENTRY_ID_LEN);
        assert!(is_entry_file_name(&id));
    }

    #[test]
    fn test_listing_file_is_not_an_entry() {
        assert!(!is_entry_file_name(LISTING_FILE));
        assert!(!is_entry_file_name(".entries.json.tmp"));
    }

    #[test]
    fn test_rejects_foreign_names() {
        assert!(!is_entry_file_name("abc.txt"));
        assert!(!is_entry_file_name("abcde.txt"));
        assert!(!is_entry_file_name("ab-c.txt"));
        assert!(!is_entry_file_name(".DS_Store"));
        assert!(is_entry_file_name("Zz09.tar"));
    }

    #[test]
    fn test_folder_name_is_stable_hex() {
        let a = folder_name("/work/project/main.rs");
        let b = folder_name("/work/project/main.rs");
        let c = folder_name("/work/project/lib.rs");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
