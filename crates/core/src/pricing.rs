use rust_decimal::Decimal;

use crate::domain::order::CylinderSize;

/// Unit prices and order limits for the cylinder catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceList {
    pub cylinder_6kg: Decimal,
    pub cylinder_13kg: Decimal,
    pub currency: String,
    pub max_quantity: u32,
}

impl Default for PriceList {
    fn default() -> Self {
        Self {
            cylinder_6kg: Decimal::from(1200),
            cylinder_13kg: Decimal::from(2800),
            currency: "KES".to_string(),
            max_quantity: 10,
        }
    }
}

impl PriceList {
    pub fn unit_price(&self, size: CylinderSize) -> Decimal {
        match size {
            CylinderSize::Kg6 => self.cylinder_6kg,
            CylinderSize::Kg13 => self.cylinder_13kg,
        }
    }

    /// Renders an amount for speech: `KES 2,400`, `KES 1,250.50`.
    pub fn format_amount(&self, amount: Decimal) -> String {
        let text = amount.round_dp(2).normalize().to_string();
        let (sign, unsigned) = match text.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", text.as_str()),
        };

        match unsigned.split_once('.') {
            Some((whole, fraction)) => {
                format!("{} {sign}{}.{fraction:0<2}", self.currency, group_thousands(whole))
            }
            None => format!("{} {sign}{}", self.currency, group_thousands(unsigned)),
        }
    }
}

fn group_thousands(digits: &str) -> String {
    let mut output = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            output.push(',');
        }
        output.push(ch);
    }
    output
}
