//! Data-quality score of a business profile, used as the completeness signal.

use lifecycle_core::types::Customer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub business_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub industry_category: Option<String>,
    pub business_description: Option<String>,
    pub products_services: Option<String>,
}

impl From<&Customer> for BusinessProfile {
    fn from(customer: &Customer) -> Self {
        let details = &customer.profile;
        Self {
            business_name: Some(customer.business_name.clone()),
            email: customer.email.clone(),
            phone: customer.phone.clone(),
            address_line1: details.address_line1.clone(),
            city: details.city.clone(),
            state: details.state.clone(),
            industry_category: details.industry_category.clone(),
            business_description: details.business_description.clone(),
            products_services: details.products_services.clone(),
        }
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Percentage of weighted profile fields that are filled in, 0–100.
pub fn profile_completeness(profile: &BusinessProfile) -> u8 {
    let checks: [(&Option<String>, u32); 9] = [
        (&profile.business_name, 10),
        (&profile.email, 15),
        (&profile.phone, 15),
        (&profile.address_line1, 10),
        (&profile.city, 10),
        (&profile.state, 10),
        (&profile.industry_category, 10),
        (&profile.business_description, 10),
        (&profile.products_services, 10),
    ];
    let max: u32 = checks.iter().map(|(_, w)| w).sum();
    let score: u32 = checks
        .iter()
        .filter(|(value, _)| filled(value))
        .map(|(_, w)| w)
        .sum();
    (score * 100 / max).min(100) as u8
}

pub fn customer_completeness(customer: &Customer) -> u8 {
    profile_completeness(&BusinessProfile::from(customer))
}
