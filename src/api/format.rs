/// How monetary values are rendered for display. Passed around by value; the
/// engine never sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub thousands_separator: char,
    pub decimal_separator: char,
    pub decimals: usize,
}

impl CurrencyFormat {
    /// `R$ 1.234,56`
    pub fn brazilian_real() -> Self {
        Self {
            symbol: "R$".to_string(),
            thousands_separator: '.',
            decimal_separator: ',',
            decimals: 2,
        }
    }

    pub fn format(&self, value: f64) -> String {
        if !value.is_finite() {
            return format!("{} {value}", self.symbol);
        }

        let fixed = format!("{:.*}", self.decimals, value.abs());
        let (int_digits, frac_digits) = match fixed.split_once('.') {
            Some((int_digits, frac_digits)) => (int_digits, Some(frac_digits)),
            None => (fixed.as_str(), None),
        };

        let mut out = String::with_capacity(fixed.len() + self.symbol.len() + 8);
        let is_zero = fixed.bytes().all(|b| b == b'0' || b == b'.');
        if value < 0.0 && !is_zero {
            out.push('-');
        }
        out.push_str(&self.symbol);
        out.push(' ');
        out.push_str(&group_digits(int_digits, self.thousands_separator));
        if let Some(frac_digits) = frac_digits {
            out.push(self.decimal_separator);
            out.push_str(frac_digits);
        }
        out
    }
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::brazilian_real()
    }
}

/// `0.1234` -> `12.34%`
pub fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

fn group_digits(digits: &str, separator: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (len - idx) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
    out
}
