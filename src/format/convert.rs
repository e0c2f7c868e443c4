//! Conversions (`!u`, `!l`, `!A`, `!b`, `!s`) and format specs (`q`, `qX`,
//! standard alignment/width/precision).

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::{FormatError, TemplateValue};

const SIZE_UNITS: [&str; 8] = ["", "k", "M", "G", "T", "P", "E", "Z"];
const SIZE_DIVISOR: f64 = 1000.0;

/// Strips accents by decomposing (NFD) and dropping combining marks.
#[must_use]
pub fn strip_accents(value: &str) -> String {
    value.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Human-readable byte size, base 1000, two decimals: `1500` → `1.50 kB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: i64) -> String {
    let mut num = bytes as f64;
    for unit in SIZE_UNITS {
        if num.abs() < SIZE_DIVISOR {
            return format!("{num:.2} {unit}B");
        }
        num /= SIZE_DIVISOR;
    }
    format!("{num:.2} YB")
}

/// Applies a `!x` conversion. The result is always text.
pub(crate) fn convert(
    field: &str,
    value: TemplateValue,
    conversion: char,
) -> Result<TemplateValue, FormatError> {
    let converted = match conversion {
        'u' => value.render().to_uppercase(),
        'l' => value.render().to_lowercase(),
        'A' => strip_accents(&value.render()),
        's' => value.render(),
        'b' => {
            let bytes = match &value {
                TemplateValue::Integer(n) => *n,
                TemplateValue::Null => {
                    return Err(FormatError::invalid_value(field, "no value to format as a size"));
                }
                other => {
                    let text = other.render();
                    text.trim().parse::<i64>().map_err(|_| {
                        FormatError::invalid_value(field, format!("'{text}' is not an integer byte count"))
                    })?
                }
            };
            format_size(bytes)
        }
        other => return Err(FormatError::UnsupportedConversion { conversion: other }),
    };
    Ok(TemplateValue::Text(converted))
}

/// Percent-escapes everything except unreserved characters.
#[must_use]
pub fn quote(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Percent-escapes but keeps spaces, then replaces them with `separator`.
#[must_use]
pub fn quote_with(value: &str, separator: char) -> String {
    value
        .split(' ')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

/// A parsed standard spec: `[[fill]align][0][width][.precision][type]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct StandardSpec {
    fill: Option<char>,
    align: Option<Align>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

fn align_of(c: char) -> Option<Align> {
    match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    }
}

impl StandardSpec {
    pub(crate) fn parse(spec: &str, template: &str) -> Result<Self, FormatError> {
        let chars: Vec<char> = spec.chars().collect();
        let mut parsed = Self::default();
        let mut pos = 0;

        if let Some(align) = chars.get(1).copied().and_then(align_of) {
            parsed.fill = Some(chars[0]);
            parsed.align = Some(align);
            pos = 2;
        } else if let Some(align) = chars.first().copied().and_then(align_of) {
            parsed.align = Some(align);
            pos = 1;
        }
        if chars.get(pos) == Some(&'0') {
            parsed.zero = true;
            pos += 1;
        }
        let digits = |pos: &mut usize| -> Option<usize> {
            let start = *pos;
            while chars.get(*pos).is_some_and(char::is_ascii_digit) {
                *pos += 1;
            }
            chars[start..*pos].iter().collect::<String>().parse().ok()
        };
        parsed.width = digits(&mut pos).unwrap_or(0);
        if chars.get(pos) == Some(&'.') {
            pos += 1;
            parsed.precision = Some(
                digits(&mut pos)
                    .ok_or_else(|| FormatError::syntax(template, format!("missing precision in ':{spec}'")))?,
            );
        }
        if let Some(kind) = chars.get(pos).copied() {
            if !matches!(kind, 's' | 'd' | 'f') {
                return Err(FormatError::syntax(template, format!("unsupported format spec ':{spec}'")));
            }
            parsed.kind = Some(kind);
            pos += 1;
        }
        if pos != chars.len() {
            return Err(FormatError::syntax(template, format!("unsupported format spec ':{spec}'")));
        }
        Ok(parsed)
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn apply(&self, field: &str, value: &TemplateValue) -> Result<String, FormatError> {
        let numeric = matches!(value, TemplateValue::Integer(_));
        let body = match (value, self.kind) {
            (TemplateValue::Integer(n), None | Some('d')) => {
                if self.precision.is_some() {
                    return Err(FormatError::invalid_value(field, "precision not allowed for integers"));
                }
                n.to_string()
            }
            (TemplateValue::Integer(n), Some('f')) => {
                format!("{:.*}", self.precision.unwrap_or(6), *n as f64)
            }
            (TemplateValue::Integer(_), _) => {
                return Err(FormatError::invalid_value(field, "integers format with 'd' or 'f'"));
            }
            (_, None | Some('s')) => {
                let text = value.render();
                match self.precision {
                    Some(precision) => text.chars().take(precision).collect(),
                    None => text,
                }
            }
            (_, Some(kind)) => {
                return Err(FormatError::invalid_value(
                    field,
                    format!("text cannot be formatted with '{kind}'"),
                ));
            }
        };

        let len = body.chars().count();
        if len >= self.width {
            return Ok(body);
        }
        let pad = self.width - len;
        let fill = self.fill.unwrap_or(if self.zero { '0' } else { ' ' });
        let align = self.align.unwrap_or(if numeric || self.zero {
            Align::Right
        } else {
            Align::Left
        });
        let repeat = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
        Ok(match align {
            Align::Left => body + &repeat(pad),
            Align::Right => repeat(pad) + &body,
            Align::Center => repeat(pad / 2) + &body + &repeat(pad - pad / 2),
        })
    }
}
