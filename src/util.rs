use std::time::Duration;

/// `mm:ss`, switching to `h:mm:ss` past the hour.
pub fn format_clock(seconds: u32) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format_clock(elapsed.as_secs().min(u64::from(u32::MAX)) as u32)
}

/// Human size for recorded blobs.
pub fn format_bytes(bytes: usize) -> String {
    match bytes {
        b if b < 1024 => format!("{b} B"),
        b if b < 1024 * 1024 => format!("{:.1} KiB", b as f64 / 1024.0),
        b => format!("{:.1} MiB", b as f64 / (1024.0 * 1024.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(120), "02:00");
        assert_eq!(format_clock(1799), "29:59");
        assert_eq!(format_clock(3661), "1:01:01");
    }

    #[test]
    fn test_format_elapsed_truncates() {
        assert_eq!(format_elapsed(Duration::from_millis(2999)), "00:02");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(12), "12 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
