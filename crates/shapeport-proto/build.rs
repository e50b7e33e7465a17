fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/onnx.proto");

    prost_build::Config::new()
        .bytes(["."])
        .compile_protos(&["src/onnx.proto"], &["src"])?;
    Ok(())
}
