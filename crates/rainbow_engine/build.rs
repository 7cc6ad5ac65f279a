// build.rs
// Compiles the G-buffer GLSL sources to SPIR-V when a Vulkan SDK is available

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: the geometry pass only clears its targets without compiled shaders");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };

    if !Path::new(&glslc).exists() {
        eprintln!("warning: glslc not found at: {}", glslc);
        return;
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {}", e);
        return;
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return;
        }
    };

    let mut compiled_count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SHADER_EXTENSIONS.contains(&ext) {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };

        // gbuffer.vert -> gbuffer.vert.spv
        let mut out_name = file_name.to_os_string();
        out_name.push(".spv");
        let out_file = target_dir.join(out_name);

        if !needs_compile(&path, &out_file) {
            eprintln!("info: Shader {:?} is up to date", file_name);
            continue;
        }

        match Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status() {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {:?} -> {:?}", path, out_file);
                compiled_count += 1;
            }
            Ok(s) => {
                eprintln!(
                    "error: glslc failed for {:?} with exit code: {}",
                    path,
                    s.code().unwrap_or(-1)
                );
                panic!("Shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: Failed to run glslc for {:?}: {}", path, e);
                panic!("Failed to execute shader compiler");
            }
        }
    }

    if compiled_count > 0 {
        eprintln!("info: Successfully compiled {} shader(s)", compiled_count);
    }
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}
