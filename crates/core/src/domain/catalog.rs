use serde::{Deserialize, Serialize};

use crate::domain::intent::Language;

/// One active catalog row with its current price. The generators and the
/// system prompt treat these rows as the only permissible product facts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name_en: String,
    pub name_ar: Option<String>,
    pub category: String,
    pub dimensions: Option<String>,
    pub material: Option<String>,
    pub firmness_level: Option<String>,
    pub warranty_years: i64,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub price_egp: i64,
    pub discount_percent: i64,
    pub is_active: bool,
}

impl Product {
    pub fn localized_name(&self, language: Language) -> &str {
        match language {
            Language::Ar => self.name_ar.as_deref().unwrap_or(&self.name_en),
            Language::En => &self.name_en,
        }
    }

    pub fn localized_description(&self, language: Language) -> &str {
        match language {
            Language::Ar => self
                .description_ar
                .as_deref()
                .or(self.description_en.as_deref())
                .unwrap_or_default(),
            Language::En => self.description_en.as_deref().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRule {
    pub id: i64,
    pub region: String,
    pub governorate: Option<String>,
    pub delivery_days_min: i64,
    pub delivery_days_max: i64,
    pub delivery_fee_egp: i64,
    pub free_delivery_threshold: i64,
    pub notes_en: Option<String>,
    pub notes_ar: Option<String>,
    pub is_active: bool,
}

impl DeliveryRule {
    pub fn localized_region(&self, language: Language) -> &str {
        match language {
            Language::Ar => self.governorate.as_deref().unwrap_or(&self.region),
            Language::En => &self.region,
        }
    }

    pub fn localized_notes(&self, language: Language) -> &str {
        match language {
            Language::Ar => {
                self.notes_ar.as_deref().or(self.notes_en.as_deref()).unwrap_or_default()
            }
            Language::En => self.notes_en.as_deref().unwrap_or_default(),
        }
    }
}
