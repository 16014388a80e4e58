use chrono::Utc;
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

fn main() {
    let out_dir = env::var_os("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("version.rs");

    let mut f = File::create(&dest_path).unwrap();

    let version = env::var("CARGO_PKG_VERSION").unwrap();
    let build_date = Utc::now().format("%Y-%m-%d").to_string();

    writeln!(f, "pub const VERSION: &str = \"{}\";", version).unwrap();
    writeln!(f, "pub const BUILD_DATE: &str = \"{}\";", build_date).unwrap();

    println!("cargo:rerun-if-changed=Cargo.toml");
}
