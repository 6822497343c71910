use std::env;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use xdrgen::CompileOptions;

// Especificaciones en idl/ que se compilan a $OUT_DIR/<nombre>.rs
const SPECS: &[&str] = &["scenarios", "shapes"];

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let options = CompileOptions::default();

    for name in SPECS {
        let path = format!("idl/{}.x", name);
        println!("cargo:rerun-if-changed={}", path);

        let src = fs::read_to_string(&path).unwrap();
        let file = File::create(Path::new(&out_dir).join(format!("{}.rs", name))).unwrap();

        if let Err(error) = xdrgen::compile(&src, &path, &options, &mut BufWriter::new(file)) {
            panic!("{}", error);
        }
    }
}
