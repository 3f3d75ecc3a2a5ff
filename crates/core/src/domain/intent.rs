use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of customer intents produced by the classifier. Never persisted
/// as a mutable entity, only logged alongside the message that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    HumanRequest,
    Complaint,
    Warranty,
    Delivery,
    StoreInfo,
    SalesPrice,
    SalesRecommendation,
    ProductInquiry,
    Greeting,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HumanRequest => "HUMAN_REQUEST",
            Self::Complaint => "COMPLAINT",
            Self::Warranty => "WARRANTY",
            Self::Delivery => "DELIVERY",
            Self::StoreInfo => "STORE_INFO",
            Self::SalesPrice => "SALES_PRICE",
            Self::SalesRecommendation => "SALES_RECOMMENDATION",
            Self::ProductInquiry => "PRODUCT_INQUIRY",
            Self::Greeting => "GREETING",
            Self::General => "GENERAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HUMAN_REQUEST" => Some(Self::HumanRequest),
            "COMPLAINT" => Some(Self::Complaint),
            "WARRANTY" => Some(Self::Warranty),
            "DELIVERY" => Some(Self::Delivery),
            "STORE_INFO" => Some(Self::StoreInfo),
            "SALES_PRICE" => Some(Self::SalesPrice),
            "SALES_RECOMMENDATION" => Some(Self::SalesRecommendation),
            "PRODUCT_INQUIRY" => Some(Self::ProductInquiry),
            "GREETING" => Some(Self::Greeting),
            "GENERAL" => Some(Self::General),
            _ => None,
        }
    }

    pub fn concerns_products(&self) -> bool {
        matches!(self, Self::SalesPrice | Self::SalesRecommendation | Self::ProductInquiry)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intent paired with the classifier's confidence in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentDetection {
    pub intent: Intent,
    pub confidence: f32,
}

impl IntentDetection {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self { intent, confidence: confidence.clamp(0.0, 1.0) }
    }
}

/// Reply language, detected by script range or declared by the client.
/// Orthogonal to intent: any keyword in any language can match any message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ar,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ar => "ar",
            Self::En => "en",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ar" => Some(Self::Ar),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
