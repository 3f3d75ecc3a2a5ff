//! Keyword intent classification and script-based language detection.
//!
//! The pattern table is ordered by priority: a human-request keyword beats a
//! greeting keyword even when both appear in one message. Keywords are not
//! language-gated; an Arabic keyword matches regardless of the detected
//! message language.

use nouma_core::{Intent, IntentDetection, Language};

pub const KEYWORD_CONFIDENCE: f32 = 0.80;
pub const FALLBACK_CONFIDENCE: f32 = 0.50;

/// Minimum confidence for an LLM-classified intent to replace a keyword
/// `GENERAL` result.
pub const LLM_ADOPTION_THRESHOLD: f32 = 0.70;

// Ordered by specificity: escalation > complaint > warranty > delivery >
// store > sales > product > greeting. First keyword hit wins.
const INTENT_PATTERNS: &[(Intent, &[&str])] = &[
    (
        Intent::HumanRequest,
        &[
            "human",
            "agent",
            "person",
            "real person",
            "talk to someone",
            "حد يرد",
            "اتكلم مع حد",
            "موظف",
            "خدمة عملاء",
            "كلمني حد",
        ],
    ),
    (
        Intent::Complaint,
        &[
            "complaint",
            "problem",
            "angry",
            "disappointed",
            "terrible",
            "worst",
            "broken",
            "شكوى",
            "مشكلة",
            "زعلان",
            "سيء",
            "وحش",
            "عايز أشكي",
            "مش راضي",
        ],
    ),
    (
        Intent::Warranty,
        &[
            "warranty",
            "guarantee",
            "defect",
            "repair",
            "warranty claim",
            "ضمان",
            "عيب",
            "تصليح",
            "كسر",
            "استبدال",
        ],
    ),
    (
        Intent::Delivery,
        &[
            "delivery",
            "shipping",
            "deliver",
            "arrive",
            "track",
            "توصيل",
            "شحن",
            "يوصل",
            "ميعاد",
            "هيوصل امتى",
            "مواعيد التوصيل",
        ],
    ),
    (
        Intent::StoreInfo,
        &[
            "store",
            "branch",
            "location",
            "address",
            "where",
            "فرع",
            "فين",
            "عنوان",
            "مكان",
            "الفروع",
            "فين الفرع",
        ],
    ),
    (
        Intent::SalesPrice,
        &["price", "cost", "how much", "pricing", "كام", "سعر", "بكام", "تكلفة", "أسعار", "ثمن"],
    ),
    (
        Intent::SalesRecommendation,
        &[
            "recommend",
            "suggest",
            "best",
            "help me choose",
            "which one",
            "انصحني",
            "ايه احسن",
            "اختار",
            "افضل",
            "عايز مرتبة",
            "تنصحني بإيه",
        ],
    ),
    (
        Intent::ProductInquiry,
        &[
            "orthopedic",
            "memory foam",
            "super soft",
            "mattress",
            "types",
            "sizes",
            "أورثوبيديك",
            "ميموري فوم",
            "سوبر سوفت",
            "مرتبة",
            "انواع",
            "مقاسات",
        ],
    ),
    (
        Intent::Greeting,
        &[
            "hello",
            "hi",
            "hey",
            "good morning",
            "good evening",
            "مرحبا",
            "أهلا",
            "السلام عليكم",
            "صباح الخير",
            "مساء الخير",
            "ازيك",
            "ازاي",
        ],
    ),
];

/// First-pass deterministic classification. Matched intents always report
/// confidence 0.80; an unmatched message is `GENERAL` at 0.50.
pub fn detect_intent(text: &str) -> IntentDetection {
    let lowered = text.to_lowercase();

    for (intent, keywords) in INTENT_PATTERNS {
        if keywords.iter().any(|keyword| lowered.contains(keyword)) {
            return IntentDetection::new(*intent, KEYWORD_CONFIDENCE);
        }
    }

    IntentDetection::new(Intent::General, FALLBACK_CONFIDENCE)
}

/// Any character in the Arabic Unicode block implies Arabic.
pub fn detect_language(text: &str) -> Language {
    if text.chars().any(|ch| ('\u{0600}'..='\u{06FF}').contains(&ch)) {
        Language::Ar
    } else {
        Language::En
    }
}

#[cfg(test)]
mod tests {
    use nouma_core::{Intent, Language};

    use super::{detect_intent, detect_language, FALLBACK_CONFIDENCE, KEYWORD_CONFIDENCE};

    #[test]
    fn greeting_detects_at_keyword_confidence() {
        let detection = detect_intent("hello");
        assert_eq!(detection.intent, Intent::Greeting);
        assert_eq!(detection.confidence, KEYWORD_CONFIDENCE);
    }

    #[test]
    fn human_request_outranks_greeting() {
        let detection = detect_intent("hello, I want to talk to a real person please");
        assert_eq!(detection.intent, Intent::HumanRequest);
        assert_eq!(detection.confidence, KEYWORD_CONFIDENCE);
    }

    #[test]
    fn complaint_outranks_sales_keywords() {
        let detection = detect_intent("I have a problem with the price I was charged");
        assert_eq!(detection.intent, Intent::Complaint);
    }

    #[test]
    fn arabic_keywords_match_regardless_of_language() {
        assert_eq!(detect_intent("عايز أعرف سعر المرتبة").intent, Intent::SalesPrice);
        assert_eq!(detect_intent("مواعيد التوصيل ايه").intent, Intent::Delivery);
        assert_eq!(detect_intent("السلام عليكم").intent, Intent::Greeting);
    }

    #[test]
    fn mixed_language_message_still_matches() {
        assert_eq!(detect_intent("hi فين الفرع؟").intent, Intent::StoreInfo);
    }

    #[test]
    fn unmatched_text_is_general_at_half_confidence() {
        let detection = detect_intent("xyzzy plugh");
        assert_eq!(detection.intent, Intent::General);
        assert_eq!(detection.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn uppercase_keywords_are_normalized() {
        assert_eq!(detect_intent("WARRANTY CLAIM NOW").intent, Intent::Warranty);
    }

    #[test]
    fn language_detection_uses_arabic_script_range() {
        assert_eq!(detect_language("hello there"), Language::En);
        assert_eq!(detect_language("مرحبا"), Language::Ar);
        assert_eq!(detect_language("price of مرتبة"), Language::Ar);
        assert_eq!(detect_language("123 !?"), Language::En);
    }
}
