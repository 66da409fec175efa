use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-env-changed=CELLBLOCK_EMBED_LEVELS_DIR");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let out_path = Path::new(&out_dir).join("cellblock_embedded_levels.json");

    let mut levels = BTreeMap::<String, String>::new();
    if let Ok(dir) = env::var("CELLBLOCK_EMBED_LEVELS_DIR") {
        println!("cargo:rerun-if-changed={dir}");
        if let Ok(entries) = fs::read_dir(&dir) {
            for path in entries.flatten().map(|e| e.path()).filter(|p| p.is_file()) {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Ok(source) = fs::read_to_string(&path) {
                    levels.insert(name.to_string(), source);
                }
            }
        }
    }

    let content = serde_json::to_string(&levels).expect("failed to encode embedded levels");
    fs::write(out_path, content).expect("failed to write embedded level data");
}
