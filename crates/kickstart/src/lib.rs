//! # kickstart
//!
//! Pure Rust library for reading and writing kickstart-style provisioning
//! documents.
//!
//! This crate provides:
//! - A typed document model ([`ProvisioningDocument`], [`Directive`],
//!   [`PackageList`], [`PostScript`])
//! - A line-oriented parser with per-line error reporting
//! - A canonical writer for re-serializing documents
//!
//! ## Example
//!
//! ```
//! use kickstart::parse_string;
//!
//! let doc = parse_string(
//!     "selinux --enforcing\n%packages\n@core\n-NetworkManager\n%end\n",
//! ).unwrap();
//!
//! assert_eq!(doc.directives[0].name, "selinux");
//! let packages = doc.packages.unwrap();
//! assert!(packages.install.contains("@core"));
//! assert!(packages.exclude.contains("NetworkManager"));
//! ```
//!
//! Execution of documents lives in the `provisioner` crate; this crate
//! never touches the system.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parser;
pub mod types;
pub mod writer;

pub use error::{Error, ErrorCategory, Result};
pub use parser::{parse_file, parse_string};
pub use types::{
    DEFAULT_INTERPRETER, Directive, KEYWORDS, Keyword, PackageList, PostScript,
    ProvisioningDocument, REDACTED, keyword,
};
pub use writer::{write_file, write_string};
