//! Build script: validates Metal Toolchain availability when the `metal` feature is enabled.

fn main() {
    println!("cargo::rustc-check-cfg=cfg(missing_metal_toolchain)");
    println!("cargo::rerun-if-env-changed=CARGO_FEATURE_METAL");

    let metal = std::env::var_os("CARGO_FEATURE_METAL").is_some();
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if !metal || !matches!(target_os.as_str(), "macos" | "ios") {
        return;
    }

    // mistralrs compiles its Metal shaders at build time with `xcrun metal`.
    let found = std::process::Command::new("xcrun")
        .args(["metal", "--version"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        println!(
            "cargo::warning=\
            Metal Toolchain not found. The `metal` feature requires Apple's Metal \
            shader compiler. Install it with:\n\n    \
            xcodebuild -downloadComponent MetalToolchain\n\n\
            This is a one-time ~700 MB download. After installing, re-run the build."
        );
        println!("cargo::rustc-cfg=missing_metal_toolchain");
    }
}
