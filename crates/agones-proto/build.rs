fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile all proto files
    // - sdk.proto: stable SDK service (lifecycle, health, watch)
    // - beta.proto: counters and lists
    // - alpha.proto: player tracking
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/sdk.proto", "proto/beta.proto", "proto/alpha.proto"],
            &["proto/"],
        )?;

    // Rebuild if any proto file changes
    println!("cargo:rerun-if-changed=proto/sdk.proto");
    println!("cargo:rerun-if-changed=proto/beta.proto");
    println!("cargo:rerun-if-changed=proto/alpha.proto");

    Ok(())
}
