use crate::core::models::BuildReport;
use colored::*;
use std::time::Instant;

pub struct BuildUI {
    start_time: Instant,
}

impl BuildUI {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn show_banner(&self) {
        println!(
            "\n  {} {}",
            "HOSTPACK".bright_cyan().bold(),
            format!("v{}", env!("CARGO_PKG_VERSION")).bright_white()
        );
        println!();
    }

    pub fn show_completion(&self, report: &BuildReport) {
        let build_time = self.start_time.elapsed();
        let dir = format!("{}/", report.output.directory.display());

        println!();
        for file in &report.output.files {
            let size_kb = file.size as f64 / 1024.0;
            let size_str = if size_kb < 1.0 {
                format!("{} B", file.size)
            } else {
                format!("{:.2} kB", size_kb)
            };

            println!(
                "  {}{} {} {}",
                dir.bright_black(),
                file.name.bright_cyan(),
                format!("({})", size_str).bright_black(),
                file.digest.bright_black()
            );
        }

        println!();
        println!(
            "  {} {} browser modules, {} host modules, {} bytes of CSS",
            "🔗".bright_green(),
            report.browser_modules.to_string().bright_cyan().bold(),
            report.host_modules.to_string().bright_cyan().bold(),
            report.stylesheet_bytes
        );
        println!(
            "  {} built in {}",
            "✓".bright_green(),
            format!("{:.0}ms", build_time.as_secs_f64() * 1000.0)
                .bright_white()
                .bold()
        );
    }
}

impl Default for BuildUI {
    fn default() -> Self {
        Self::new()
    }
}
