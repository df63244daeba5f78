use time::{Date, OffsetDateTime};

pub const DEFAULT_DATE_FORMAT: &str = "Y-m-d";

/// Formats a timestamp with a compact letter-per-component pattern
/// (`Y-m-d`, `d/m/Y`, `j F Y`, `H:i` ...).
///
/// Unknown letters are copied through; a backslash copies the next
/// character literally.
pub fn format_datetime(value: OffsetDateTime, pattern: &str) -> String {
    let description = to_format_description(pattern);

    match time::format_description::parse_borrowed::<1>(&description) {
        Ok(items) => value
            .format(&items[..])
            .unwrap_or_else(|_| fallback(value)),
        Err(_) => fallback(value),
    }
}

/// Dates are formatted as midnight UTC so time components render as zero.
pub fn format_date(value: Date, pattern: &str) -> String {
    format_datetime(value.midnight().assume_utc(), pattern)
}

fn fallback(value: OffsetDateTime) -> String {
    let date = value.date();
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

fn to_format_description(pattern: &str) -> String {
    let mut description = String::with_capacity(pattern.len() * 4);
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        let component = match c {
            'd' => "[day]",
            'j' => "[day padding:none]",
            'D' => "[weekday repr:short]",
            'l' => "[weekday]",
            'N' => "[weekday repr:monday]",
            'm' => "[month]",
            'n' => "[month padding:none]",
            'M' => "[month repr:short]",
            'F' => "[month repr:long]",
            'Y' => "[year]",
            'y' => "[year repr:last_two]",
            'H' => "[hour]",
            'G' => "[hour padding:none]",
            'h' => "[hour repr:12]",
            'g' => "[hour repr:12 padding:none]",
            'i' => "[minute]",
            's' => "[second]",
            'A' => "[period]",
            'a' => "[period case:lower]",
            '\\' => {
                if let Some(escaped) = chars.next() {
                    push_literal(&mut description, escaped);
                }
                continue;
            }
            other => {
                push_literal(&mut description, other);
                continue;
            }
        };
        description.push_str(component);
    }

    description
}

fn push_literal(description: &mut String, c: char) {
    if c == '[' {
        description.push_str("[[");
    } else {
        description.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn default_pattern_is_iso_date() {
        assert_eq!(format_date(date!(2025 - 03 - 07), DEFAULT_DATE_FORMAT), "2025-03-07");
    }

    #[test]
    fn supports_day_first_and_long_month_names() {
        let value = datetime!(2025-12-01 14:05:09 UTC);
        assert_eq!(format_datetime(value, "d/m/Y"), "01/12/2025");
        assert_eq!(format_datetime(value, "j F Y"), "1 December 2025");
        assert_eq!(format_datetime(value, "M j, Y H:i"), "Dec 1, 2025 14:05");
    }

    #[test]
    fn escapes_and_brackets_are_literal() {
        let value = datetime!(2025-01-02 00:00:00 UTC);
        assert_eq!(format_datetime(value, "\\Y Y"), "Y 2025");
        assert_eq!(format_datetime(value, "[Y"), "[2025");
    }

    #[test]
    fn time_components_on_plain_dates_render_as_midnight() {
        assert_eq!(format_date(date!(2025 - 06 - 30), "Y-m-d H:i"), "2025-06-30 00:00");
    }
}
