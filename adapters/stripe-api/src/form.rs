//! Stripe form encoding. Stripe takes `application/x-www-form-urlencoded`
//! bodies with bracketed keys for nested objects and arrays, e.g.
//! `line_items[0][price_data][unit_amount]=1999`.

use domain::{NewCheckoutSession, NewCustomer, NewPaymentIntent};

pub type Params = Vec<(String, String)>;

fn push(params: &mut Params, key: impl Into<String>, value: impl ToString) {
    params.push((key.into(), value.to_string()));
}

/// Parameters for `POST /v1/checkout/sessions`.
pub fn checkout_session_params(session: &NewCheckoutSession) -> Params {
    let mut p = Params::new();
    push(&mut p, "mode", "payment");
    push(&mut p, "payment_method_types[0]", "card");
    push(&mut p, "success_url", &session.success_url);
    push(&mut p, "cancel_url", &session.cancel_url);
    push(&mut p, "client_reference_id", session.client_reference_id.as_str());
    push(&mut p, "metadata[userId]", session.client_reference_id.as_str());
    for (i, item) in session.line_items.iter().enumerate() {
        let base = format!("line_items[{}]", i);
        let price = format!("{}[price_data]", base);
        let product = format!("{}[product_data]", price);
        push(&mut p, format!("{}[currency]", price), &item.currency);
        push(&mut p, format!("{}[unit_amount]", price), item.unit_amount);
        push(&mut p, format!("{}[name]", product), &item.name);
        push(&mut p, format!("{}[description]", product), &item.description);
        push(&mut p, format!("{}[metadata][productId]", product), &item.product_id);
        push(&mut p, format!("{}[metadata][size]", product), &item.size);
        push(&mut p, format!("{}[quantity]", base), item.quantity);
    }
    p
}

/// Parameters for `POST /v1/customers`.
pub fn customer_params(customer: &NewCustomer) -> Params {
    let mut p = Params::new();
    push(&mut p, "metadata[userId]", customer.user_id.as_str());
    if let Some(name) = &customer.name {
        push(&mut p, "name", name);
    }
    if let Some(phone) = &customer.phone {
        push(&mut p, "phone", phone);
    }
    p
}

/// Parameters for `POST /v1/ephemeral_keys`.
pub fn ephemeral_key_params(customer_id: &str) -> Params {
    vec![("customer".into(), customer_id.into())]
}

/// Parameters for `POST /v1/payment_intents`.
pub fn payment_intent_params(intent: &NewPaymentIntent) -> Params {
    let mut p = Params::new();
    push(&mut p, "amount", intent.amount);
    push(&mut p, "currency", &intent.currency);
    push(&mut p, "customer", &intent.customer);
    push(&mut p, "automatic_payment_methods[enabled]", "true");
    push(&mut p, "metadata[userId]", intent.user_id.as_str());

    let s = &intent.shipping;
    push(&mut p, "shipping[name]", &s.name);
    if let Some(phone) = &s.phone {
        push(&mut p, "shipping[phone]", phone);
    }
    push(&mut p, "shipping[address][line1]", &s.address.line1);
    push(&mut p, "shipping[address][city]", &s.address.city);
    push(&mut p, "shipping[address][postal_code]", &s.address.postal_code);
    if let Some(country) = &s.address.country {
        push(&mut p, "shipping[address][country]", country);
    }
    if let Some(state) = &s.address.state {
        push(&mut p, "shipping[address][state]", state);
    }
    p
}
