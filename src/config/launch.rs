// src/config/launch.rs
//! Browser launch profile. The core treats this as opaque: it only selects
//! which Chromium flags and binary the session factory starts with.

use std::path::PathBuf;

pub const ENV_RESTRICTED_MODE: &str = "SCRAPER_RESTRICTED_MODE";
pub const ENV_BROWSER_EXECUTABLE: &str = "BROWSER_EXECUTABLE_PATH";

const DEFAULT_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-sync",
    "--mute-audio",
    "--no-first-run",
    "--hide-scrollbars",
];

// Serverless / low-memory hosts.
const RESTRICTED_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-setuid-sandbox",
    "--no-sandbox",
    "--no-zygote",
    "--single-process",
    "--disable-extensions",
    "--disable-accelerated-2d-canvas",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-features=TranslateUI,site-per-process",
    "--disable-ipc-flooding-protection",
    "--disable-renderer-backgrounding",
    "--disable-threaded-animation",
    "--disable-threaded-scrolling",
    "--memory-pressure-off",
    "--use-gl=swiftshader",
    "--mute-audio",
    "--disable-default-apps",
    "--disable-sync",
    "--hide-scrollbars",
    "--no-first-run",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    pub restricted: bool,
    pub executable: Option<PathBuf>,
}

impl LaunchProfile {
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(ENV_RESTRICTED_MODE).ok(),
            std::env::var(ENV_BROWSER_EXECUTABLE).ok(),
        )
    }

    fn from_values(restricted: Option<String>, executable: Option<String>) -> Self {
        let restricted = restricted
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let executable = executable
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Self {
            restricted,
            executable,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let set = if self.restricted {
            RESTRICTED_ARGS
        } else {
            DEFAULT_ARGS
        };
        set.iter().map(|s| s.to_string()).collect()
    }
}
