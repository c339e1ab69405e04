//! Terminal rendering helpers for progress output

use std::fmt;

/// Byte count rendered with binary units and one decimal place
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl ByteSize {
    const UNITS: [&'static str; 5] = ["B", "KB", "MB", "GB", "TB"];

    pub fn to_human_readable(&self) -> String {
        let mut unit = 0;
        let mut divisor = 1u64;
        while unit + 1 < Self::UNITS.len() && self.0 >= divisor * 1024 {
            divisor *= 1024;
            unit += 1;
        }

        if unit == 0 {
            return format!("{}B", self.0);
        }
        let whole = self.0 / divisor;
        let tenth = (self.0 % divisor) * 10 / divisor;
        if tenth == 0 {
            format!("{}{}", whole, Self::UNITS[unit])
        } else {
            format!("{}.{}{}", whole, tenth, Self::UNITS[unit])
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

/// Width of the bar drawn by [`progress_bar`]
pub const BAR_WIDTH: usize = 50;

/// `[=====     ] 42%`, with `percent` clamped to 100
pub fn progress_bar(percent: u8) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * BAR_WIDTH / 100;
    format!(
        "[{}{}] {}%",
        "=".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        percent
    )
}
