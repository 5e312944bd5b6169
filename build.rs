use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=assets/volknob.ico");

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let icon = Path::new("assets/volknob.ico");
    if target_os != "windows" || !icon.exists() {
        return;
    }

    let mut res = winres::WindowsResource::new();
    res.set_icon("assets/volknob.ico");
    if let Err(e) = res.compile() {
        println!("cargo:warning=failed to embed the application icon: {e}");
    }
}
