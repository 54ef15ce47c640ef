use std::env;
use std::fs;
use std::path::Path;

include!("../build_common.rs");

fn main() {
    readme_to_rustdoc(env!("CARGO_MANIFEST_DIR"));
}
