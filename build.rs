// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

// Pre-build code for the platform layer.

// This generates the `kconfig` module, holding the numeric and string settings the crate is
// built with.  Settings come from a dotconfig style file named by `IOT_PLATFORM_DOTCONFIG`
// (`CONFIG_NAME=value` lines), and can be overridden one at a time through environment variables
// of the same name.  Anything not given keeps its default.

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use regex::Regex;

/// The kind of Rust constant a setting becomes.
#[derive(Clone, Copy)]
enum Kind {
    U32,
    Usize,
    Str,
}

impl Kind {
    fn rust_type(self) -> &'static str {
        match self {
            Kind::U32 => "u32",
            Kind::Usize => "usize",
            Kind::Str => "&'static str",
        }
    }
}

/// Every setting understood by the crate, with its default.
const SETTINGS: &[(&str, Kind, &str)] = &[
    // Scheduler tick rate.  Must evenly divide 1000 so the tick period is a whole number of ms.
    ("CONFIG_TICK_RATE_HZ", Kind::U32, "1000"),
    // Ticks a task context lock waits before failing.  The maximum tick value waits forever.
    ("CONFIG_MUTEX_WAIT_TICKS", Kind::U32, "0xFFFFFFFF"),
    // Size in bytes of the kernel's static semaphore storage (`StaticSemaphore_t`).
    ("CONFIG_STATIC_SEMAPHORE_SIZE", Kind::Usize, "80"),
    // Maximum level passed through the `log` facade.
    ("CONFIG_LOG_LEVEL", Kind::Str, "\"info\""),
];

fn main() -> Result<()> {
    let outdir = env::var("OUT_DIR").context("OUT_DIR must be set")?;

    let mut values: BTreeMap<&str, String> = SETTINGS
        .iter()
        .map(|&(name, _, default)| (name, default.to_string()))
        .collect();

    // The assumption is that hex and decimal values are unsigned.
    let config_line = Regex::new(r#"^(CONFIG_[A-Z0-9_]+)=(0x[0-9a-fA-F]+|[0-9]+|".*")$"#)?;

    println!("cargo:rerun-if-env-changed=IOT_PLATFORM_DOTCONFIG");
    if let Ok(dotconfig) = env::var("IOT_PLATFORM_DOTCONFIG") {
        println!("cargo:rerun-if-changed={}", dotconfig);

        let text = fs::read_to_string(&dotconfig)
            .with_context(|| format!("Unable to read dotconfig {}", dotconfig))?;
        for line in text.lines() {
            if let Some(caps) = config_line.captures(line.trim()) {
                if let Some(slot) = values.get_mut(&caps[1]) {
                    *slot = caps[2].to_string();
                }
            }
        }
    }

    for &(name, _, _) in SETTINGS {
        println!("cargo:rerun-if-env-changed={}", name);
        if let Ok(value) = env::var(name) {
            values.insert(name, value.trim().to_string());
        }
    }

    let gen_path = Path::new(&outdir).join("kconfig.rs");
    let mut f = File::create(&gen_path)?;

    for &(name, kind, _) in SETTINGS {
        let value = &values[name];
        let quoted = value.starts_with('"') && value.ends_with('"') && value.len() >= 2;
        match kind {
            Kind::Str if !quoted => bail!("{} must be a quoted string, got {}", name, value),
            Kind::U32 | Kind::Usize if quoted => bail!("{} must be numeric, got {}", name, value),
            _ => (),
        }
        writeln!(&mut f, "#[allow(dead_code)]")?;
        writeln!(&mut f, "pub const {}: {} = {};", name, kind.rust_type(), value)?;
    }

    Ok(())
}
