use std::process::Command;

fn main() {
    // Release pipelines without a checkout pass the revision in DESKCHAT_GIT_SHA
    let build = std::env::var("DESKCHAT_GIT_SHA")
        .ok()
        .filter(|sha| !sha.is_empty())
        .or_else(|| {
            Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        })
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env=DESKCHAT_BUILD={build}");
    println!("cargo:rerun-if-env-changed=DESKCHAT_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
