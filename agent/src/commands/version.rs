//! `hoistd version`

/// Prints the build version and, when `HOIST_VERSION_DETAILS` overrides
/// it, the version reported in heartbeats.
pub fn run(reported: &str, json: bool) {
    let build = env!("CARGO_PKG_VERSION");

    if json {
        let out = serde_json::json!({ "name": "hoistd", "version": build, "reported": reported });
        println!("{out}");
    } else if reported == build {
        println!("hoistd {build}");
    } else {
        println!("hoistd {build} (reports {reported})");
    }
}
