//! Input validation for the two handlers. Inputs arrive as untyped JSON so
//! that shape errors map to `invalid-argument` instead of transport errors.

use serde_json::Value;

use crate::{CartItem, CoreError, PaymentRequest, ShippingDetails};

/// Parse the checkout payload `{ items: [...] }`.
///
/// `items` must be an array; each element must carry `productId`, `size`,
/// `quantity` and `price`. An empty array is passed through.
pub fn parse_checkout_items(data: &Value) -> Result<Vec<CartItem>, CoreError> {
    let items = match data.get("items") {
        Some(Value::Array(items)) => items,
        _ => return Err(CoreError::invalid("items must be an array")),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            serde_json::from_value::<CartItem>(raw.clone())
                .map_err(|e| CoreError::invalid(format!("items[{}]: {}", i, e)))
        })
        .collect()
}

/// Parse the payment intent payload `{ amount, shipping: { name, phone, address } }`.
pub fn parse_payment_request(data: &Value) -> Result<PaymentRequest, CoreError> {
    let amount = parse_amount(data.get("amount"))?;

    let raw_shipping = match data.get("shipping") {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => return Err(CoreError::invalid("shipping is required")),
    };
    let mut shipping: ShippingDetails = serde_json::from_value(raw_shipping)
        .map_err(|e| CoreError::invalid(format!("shipping: {}", e)))?;

    require("shipping.name", &shipping.name)?;
    require("shipping.address.line1", &shipping.address.line1)?;
    require("shipping.address.city", &shipping.address.city)?;
    require("shipping.address.postal_code", &shipping.address.postal_code)?;

    shipping.phone = non_blank(shipping.phone);
    shipping.address.country = non_blank(shipping.address.country);
    shipping.address.state = non_blank(shipping.address.state);

    Ok(PaymentRequest { amount, shipping })
}

fn parse_amount(raw: Option<&Value>) -> Result<u64, CoreError> {
    let n = match raw {
        None | Some(Value::Null) => return Err(CoreError::invalid("amount is required")),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(CoreError::invalid("amount must be a number")),
    };
    let amount = match n.as_u64() {
        Some(v) => v,
        // Clients built on JS numbers may send `1500.0`
        None => match n.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                f as u64
            }
            _ => {
                return Err(CoreError::invalid(
                    "amount must be a whole number of minor units",
                ))
            }
        },
    };
    if amount == 0 {
        return Err(CoreError::invalid("amount must be greater than zero"));
    }
    Ok(amount)
}

fn require(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::invalid(format!("{} is required", field)));
    }
    Ok(())
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}
