pub struct Formatter {}

impl Formatter {
    const UNITS: [&'static str; 5] = ["B", "KB", "MB", "GB", "TB"];

    pub fn format_size(size: u64, precision: u8) -> String {
        let mut size_float = size as f64;
        let mut unit = 0;

        while size_float > 1024.0 && unit < Self::UNITS.len() - 1 {
            size_float /= 1024.0;
            unit += 1;
        }

        format!(
            "{number:.prec$} {unit}",
            number = size_float,
            prec = precision as usize,
            unit = Self::UNITS[unit]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Formatter;

    #[test]
    fn picks_the_largest_fitting_unit() {
        assert_eq!(Formatter::format_size(512, 2), "512.00 B");
        assert_eq!(Formatter::format_size(1536, 1), "1.5 KB");
        assert_eq!(Formatter::format_size(5 * 1024 * 1024 * 1024, 0), "5 GB");
    }
}
