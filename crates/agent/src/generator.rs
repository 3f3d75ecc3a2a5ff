//! Response tier selection and the deterministic per-agent generators.
//!
//! Tier order: intent-level static answers, escalation handover, generative
//! completion, then the keyword generators. The generative tier never
//! propagates an error; any failure degrades to the deterministic tier.

use tracing::warn;

use nouma_core::{
    AgentKind, AgentProfile, DeliveryRule, Intent, Language, Product, ProductCard, ReplyBody,
};

use crate::llm::{ChatTurn, LlmClient};
use crate::prompt::build_system_prompt;

/// Database rows supplied to a single turn. The generators never invent
/// data that is not present here.
#[derive(Clone, Debug, Default)]
pub struct ReplyContext {
    pub products: Vec<Product>,
    pub delivery_rules: Vec<DeliveryRule>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedReply {
    pub body: ReplyBody,
    pub llm_used: bool,
    pub escalated: bool,
}

impl GeneratedReply {
    fn deterministic(body: ReplyBody) -> Self {
        Self { body, llm_used: false, escalated: false }
    }
}

/// The fixed set of centimeter widths a customer can name. A price is only
/// revealed once one of these appears in the message.
const SIZE_TOKENS: &[&str] = &["120", "140", "150", "160", "170", "180", "200"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProductCategory {
    Orthopedic,
    MemoryFoam,
    Soft,
}

impl ProductCategory {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Orthopedic => "orthopedic",
            Self::MemoryFoam => "memory_foam",
            Self::Soft => "soft",
        }
    }

    fn label(&self, language: Language) -> &'static str {
        match (self, language) {
            (Self::Orthopedic, Language::Ar) => "أورثوبيديك",
            (Self::Orthopedic, Language::En) => "Orthopedic",
            (Self::MemoryFoam, Language::Ar) => "ميموري فوم",
            (Self::MemoryFoam, Language::En) => "Memory Foam",
            (Self::Soft, Language::Ar) => "سوبر سوفت",
            (Self::Soft, Language::En) => "Super Soft",
        }
    }
}

pub async fn generate_reply(
    profile: &AgentProfile,
    intent: Intent,
    message: &str,
    language: Language,
    history: &[ChatTurn],
    context: &ReplyContext,
    llm: Option<&dyn LlmClient>,
) -> GeneratedReply {
    // Tier 0: intent-level static answers, regardless of routed agent.
    match intent {
        Intent::Greeting => return GeneratedReply::deterministic(greeting_reply(language)),
        Intent::StoreInfo => return GeneratedReply::deterministic(store_info_reply(language)),
        _ => {}
    }

    // Tier 0b: the escalation agent is terminal for the turn.
    if profile.kind == AgentKind::Escalation {
        return GeneratedReply {
            body: escalation_reply(profile, language),
            llm_used: false,
            escalated: true,
        };
    }

    // Tier 1: generative completion, if available.
    if let Some(llm) = llm {
        let system_prompt = build_system_prompt(profile, language, context);
        match llm.complete(&system_prompt, history, message).await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                return GeneratedReply {
                    body: ReplyBody::text(text),
                    llm_used: true,
                    escalated: false,
                };
            }
            Ok(_) => {
                warn!(
                    agent = %profile.name,
                    %intent,
                    "empty generative completion, falling back to keyword generator"
                );
            }
            Err(error) => {
                warn!(
                    agent = %profile.name,
                    %intent,
                    %error,
                    "generative call failed, falling back to keyword generator"
                );
            }
        }
    }

    // Tier 2: deterministic per-agent generators. The kind enum already
    // folded unknown agent names into Support at the routing boundary.
    let body = match profile.kind {
        AgentKind::Sales => sales_reply(intent, message, language, &context.products),
        AgentKind::Warranty => warranty_reply(language),
        AgentKind::Complaint => complaint_reply(language),
        AgentKind::Support | AgentKind::Escalation | AgentKind::Router => {
            support_reply(intent, language, &context.delivery_rules)
        }
    };
    GeneratedReply::deterministic(body)
}

/// Scans digit runs for one of the known centimeter widths. The unit word
/// (`cm` / `سم`) is optional and ignored.
pub(crate) fn find_size_token(text: &str) -> Option<&'static str> {
    let mut run = String::new();
    let mut runs = Vec::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            run.push(ch);
        } else if !run.is_empty() {
            runs.push(std::mem::take(&mut run));
        }
    }
    if !run.is_empty() {
        runs.push(run);
    }

    runs.into_iter().find_map(|run| SIZE_TOKENS.iter().copied().find(|size| *size == run))
}

fn category_from_message(lowered: &str) -> Option<ProductCategory> {
    if lowered.contains("orthop") || lowered.contains("أورثوبيديك") || lowered.contains("طبي") {
        Some(ProductCategory::Orthopedic)
    } else if lowered.contains("memory") || lowered.contains("ميموري") {
        Some(ProductCategory::MemoryFoam)
    } else if lowered.contains("soft") || lowered.contains("سوفت") || lowered.contains("ناعم") {
        Some(ProductCategory::Soft)
    } else {
        None
    }
}

/// Thousands-grouped EGP amount, e.g. `12,500`.
pub(crate) fn format_egp(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn product_card_reply(product: &Product, language: Language) -> ReplyBody {
    let text = match language {
        Language::Ar => format!("تمام! ده تفاصيل {}:", product.localized_name(language)),
        Language::En => format!("Here are the details for {}:", product.localized_name(language)),
    };
    let warranty = match language {
        Language::Ar => format!("{} سنين ضمان", product.warranty_years),
        Language::En => format!("{} years warranty", product.warranty_years),
    };

    ReplyBody::ProductCard {
        text,
        product: ProductCard {
            name: product.localized_name(language).to_string(),
            description: product.localized_description(language).to_string(),
            price: format!("{} EGP", format_egp(product.price_egp)),
            warranty,
            url: "#".to_string(),
        },
    }
}

fn sales_reply(
    intent: Intent,
    message: &str,
    language: Language,
    products: &[Product],
) -> ReplyBody {
    let lowered = message.to_lowercase();
    let category = category_from_message(&lowered);

    let mut rows: Vec<&Product> = products.iter().filter(|product| product.is_active).collect();
    match category {
        Some(category) => rows.retain(|product| product.category == category.as_str()),
        None => {
            rows.retain(|product| product.category != "accessories");
        }
    }
    rows.sort_by_key(|product| product.price_egp);
    if category.is_none() {
        rows.truncate(3);
    }

    if rows.is_empty() {
        return ReplyBody::text(match language {
            Language::Ar => "للأسف مش لاقي المنتج ده دلوقتي. ممكن أعرض عليك بدايل تانية؟",
            Language::En => {
                "I couldn't find that specific product right now. Would you like to see some alternatives?"
            }
        });
    }

    if matches!(intent, Intent::SalesPrice | Intent::ProductInquiry) {
        // A size names exactly one product; only then is a price revealed.
        if let Some(size) = find_size_token(&lowered) {
            let matching = rows.iter().find(|product| {
                product.dimensions.as_deref().map(|dims| dims.contains(size)).unwrap_or(false)
            });
            if let Some(product) = matching {
                return product_card_reply(product, language);
            }
        }

        // No size yet: list the available sizes and ask, never prices.
        let mut sizes: Vec<&str> = Vec::new();
        for product in &rows {
            if let Some(dimensions) = product.dimensions.as_deref() {
                if !dimensions.is_empty() && !sizes.contains(&dimensions) {
                    sizes.push(dimensions);
                }
            }
        }
        let sizes = sizes.join(", ");

        let text = match (language, category) {
            (Language::Ar, Some(category)) => format!(
                "تمام! مرتبة {} متاحة بالمقاسات دي: {sizes}.\n\nمحتاج مقاس كام؟ قولي المقاس وهقولك السعر على طول.",
                category.label(language)
            ),
            (Language::Ar, None) => format!(
                "تمام! المراتب متاحة بالمقاسات دي: {sizes}.\n\nمحتاج مقاس كام؟ قولي المقاس وهقولك السعر على طول."
            ),
            (Language::En, Some(category)) => format!(
                "Great! The {} mattress is available in these sizes: {sizes}.\n\nWhich size do you need? Tell me and I'll give you the exact price.",
                category.label(language)
            ),
            (Language::En, None) => format!(
                "Great! Our mattresses are available in these sizes: {sizes}.\n\nWhich size do you need? Tell me and I'll give you the exact price."
            ),
        };
        return ReplyBody::text(text);
    }

    ReplyBody::text(match language {
        Language::Ar => {
            "أهلاً بيك! عندنا 3 أنواع مراتب: أورثوبيديك (طبية للظهر)، ميموري فوم (راحة فائقة)، وسوبر سوفت (نعومة استثنائية). عايز أساعدك تختار؟ قولي ميزانيتك أو إيه اللي بتدور عليه."
        }
        Language::En => {
            "Welcome! We have 3 mattress types: Orthopedic (back support), Memory Foam (ultimate comfort), and Super Soft (exceptional softness). Would you like help choosing? Tell me your budget or what you're looking for."
        }
    })
}

fn support_reply(intent: Intent, language: Language, delivery_rules: &[DeliveryRule]) -> ReplyBody {
    if intent == Intent::Delivery && !delivery_rules.is_empty() {
        let mut rules: Vec<&DeliveryRule> =
            delivery_rules.iter().filter(|rule| rule.is_active).collect();
        rules.sort_by_key(|rule| rule.delivery_days_min);

        if !rules.is_empty() {
            let day_word = match language {
                Language::Ar => "يوم",
                Language::En => "days",
            };
            let lines = rules
                .iter()
                .map(|rule| {
                    format!(
                        "• {}: {}-{} {} - {}",
                        rule.localized_region(language),
                        rule.delivery_days_min,
                        rule.delivery_days_max,
                        day_word,
                        rule.localized_notes(language)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");

            let text = match language {
                Language::Ar => format!(
                    "مواعيد التوصيل حسب المنطقة:\n\n{lines}\n\nالتوصيل مجاني للطلبات فوق 5,000 جنيه في القاهرة والجيزة."
                ),
                Language::En => format!(
                    "Delivery times by region:\n\n{lines}\n\nFree delivery for orders above 5,000 EGP in Cairo and Giza."
                ),
            };
            return ReplyBody::text(text);
        }
    }

    ReplyBody::text(match language {
        Language::Ar => {
            "أهلاً بيك في نوما! إزاي أقدر أساعدك؟ ممكن أساعدك في:\n• أسعار المراتب\n• مواعيد التوصيل\n• معلومات الضمان\n• شكوى أو مشكلة"
        }
        Language::En => {
            "Welcome to Nouma! How can I help you? I can assist with:\n• Mattress prices\n• Delivery information\n• Warranty details\n• Complaints or issues"
        }
    })
}

fn warranty_reply(language: Language) -> ReplyBody {
    ReplyBody::text(match language {
        Language::Ar => {
            "الضمان في نوما:\n\n• مرتبة أورثوبيديك: ضمان 10 سنين\n• مرتبة ميموري فوم: ضمان 12 سنة\n• مرتبة سوبر سوفت: ضمان 8 سنين\n\nالضمان يشمل عيوب الصناعة. لو عندك مشكلة، ابعتلنا صورة ورقم الفاتورة وهنساعدك."
        }
        Language::En => {
            "Nouma Warranty:\n\n• Orthopedic: 10-year warranty\n• Memory Foam: 12-year warranty\n• Super Soft: 8-year warranty\n\nWarranty covers manufacturing defects. If you have an issue, send us a photo and invoice number and we'll help."
        }
    })
}

fn complaint_reply(language: Language) -> ReplyBody {
    ReplyBody::text(match language {
        Language::Ar => {
            "آسفين جداً لأي إزعاج! رأيك مهم لينا. ممكن تقولنا:\n\n1. إيه المشكلة بالظبط؟\n2. إمتى حصلت؟\n3. رقم الفاتورة لو متاح\n\nهنحاول نحل المشكلة بأسرع وقت."
        }
        Language::En => {
            "We're very sorry for any inconvenience! Your feedback matters. Can you tell us:\n\n1. What exactly is the issue?\n2. When did it happen?\n3. Invoice number if available\n\nWe'll try to resolve this as quickly as possible."
        }
    })
}

fn escalation_reply(profile: &AgentProfile, language: Language) -> ReplyBody {
    let default = match language {
        Language::Ar => "هحولك دلوقتي لأحد ممثلي خدمة العملاء. استنى لحظة من فضلك.",
        Language::En => "I'm connecting you with a customer service representative. Please hold.",
    };
    ReplyBody::handover(profile.escalation_message(language).unwrap_or(default))
}

fn greeting_reply(language: Language) -> ReplyBody {
    ReplyBody::text(match language {
        Language::Ar => {
            "أهلاً بيك في نوما! إزاي أقدر أساعدك النهاردة؟ ممكن أساعدك في:\n\n• أسعار المراتب والمنتجات\n• توصيات واختيار المرتبة المناسبة\n• مواعيد التوصيل والشحن\n• معلومات الضمان\n• عناوين الفروع"
        }
        Language::En => {
            "Welcome to Nouma! How can I help you today? I can assist with:\n\n• Mattress prices and products\n• Recommendations and choosing the right mattress\n• Delivery and shipping times\n• Warranty information\n• Branch locations"
        }
    })
}

fn store_info_reply(language: Language) -> ReplyBody {
    ReplyBody::text(match language {
        Language::Ar => {
            "فروع نوما:\n\n📍 فرع مدينة نصر: عباس العقاد، القاهرة\n📍 فرع المهندسين: شارع جامعة الدول العربية\n\n📞 للاستفسار: +20 2 2345 6789\n⏰ مواعيد العمل: السبت - الخميس، 10 صباحاً - 10 مساءً"
        }
        Language::En => {
            "Nouma Branches:\n\n📍 Nasr City: Abbas El-Akkad St., Cairo\n📍 Mohandiseen: Gameat El Dowal El Arabeya St.\n\n📞 Call us: +20 2 2345 6789\n⏰ Hours: Sat - Thu, 10 AM - 10 PM"
        }
    })
}
