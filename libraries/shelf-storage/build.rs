//! Build script for shelf-storage.
//!
//! Rebuilds the crate when the embedded catalog migrations change.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
