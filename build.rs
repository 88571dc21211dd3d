use regex::Regex;
use std::fs;
use std::process::Command;

fn git(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|out| out.trim().to_string())
        .unwrap_or_else(|| "undetermined".into())
}

fn main() {
    println!("cargo:rustc-env=GIT_HASH={}", git(&["rev-parse", "HEAD"]));
    println!("cargo:rustc-env=GIT_COUNT={}", git(&["rev-list", "--count", "HEAD"]));
    println!("cargo:rerun-if-changed=.git/HEAD");

    if let Ok(head) = fs::read_to_string(".git/HEAD") {
        let re = Regex::new(r"ref: (.*)").expect("valid regex");
        if let Some(captures) = re.captures(&head) {
            println!(
                "cargo:rerun-if-changed=.git/{}",
                captures.get(1).map_or("", |m| m.as_str())
            );
        }
    }
}
