// Build script for haloctl - embeds firmware version at compile time

fn main() {
    // Release tooling sets HALO_VERSION; local builds use Cargo.toml
    let version =
        std::env::var("HALO_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=HALO_VERSION={}", version);

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=HALO_VERSION");
}
