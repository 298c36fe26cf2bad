use std::{env, fs, path::PathBuf};

// Bakes shaders/*.{vert,frag} into OUT_DIR as SPIR-V. A compile error fails the
// build with the compiler diagnostic.
fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let src_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir")).join("shaders");

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (file, kind) in [
        ("shader.vert", shaderc::ShaderKind::Vertex),
        ("shader.frag", shaderc::ShaderKind::Fragment),
    ] {
        let path = src_dir.join(file);
        println!("cargo:rerun-if-changed={}", path.display());

        let source = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
        let spirv = match comp.compile_into_spirv(&source, kind, file, "main", Some(&opts)) {
            Ok(s) => s,
            Err(e) => panic!("shader compilation failed for {file}:\n{e}"),
        };
        fs::write(out.join(format!("{file}.spv")), spirv.as_binary_u8())
            .unwrap_or_else(|e| panic!("writing {file}.spv: {e}"));
    }

    println!("cargo:rerun-if-changed=build.rs");
}
