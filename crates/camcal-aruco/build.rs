//! Embeds every `data/<NAME>_CODES.json` table as a static slice.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::Deserialize;

#[derive(Deserialize)]
struct Table {
    name: String,
    marker_size: usize,
    max_correction_bits: u8,
    codes: Vec<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data = Path::new("data");
    println!("cargo:rerun-if-changed={}", data.display());

    let mut paths: Vec<_> = fs::read_dir(data)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_CODES.json"))
        })
        .collect();
    paths.sort();

    let mut out = String::from("pub(crate) static BUILTIN_TABLES: &[BuiltinTable] = &[\n");
    for path in &paths {
        println!("cargo:rerun-if-changed={}", path.display());
        let table: Table = serde_json::from_str(&fs::read_to_string(path)?)?;
        writeln!(
            out,
            "    BuiltinTable {{ name: {:?}, marker_size: {}, max_correction_bits: {}, codes: &{:?} }},",
            table.name, table.marker_size, table.max_correction_bits, table.codes
        )?;
    }
    out.push_str("];\n");

    let dest = Path::new(&env::var("OUT_DIR")?).join("builtins.rs");
    fs::write(dest, out)?;
    Ok(())
}
