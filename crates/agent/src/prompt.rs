//! System-prompt assembly for the generative tier.
//!
//! The prompt is built from the agent profile and the turn's database
//! context only; catalog rows are presented as the sole permissible facts
//! and the sales size-before-price rule is restated verbatim so the model
//! enforces the same policy as the deterministic generator.

use nouma_core::{AgentKind, AgentProfile, Language};

use crate::generator::{format_egp, ReplyContext};

const DEFAULT_IDENTITY: &str =
    "a customer service agent for Nouma Mattresses (نوما للمراتب), an Egyptian mattress brand";

const SALES_PRICING_RULE: &str = "MANDATORY PRICING RULE — YOU MUST FOLLOW THIS:
- NEVER quote a price, list prices, or mention any EGP amount UNTIL the customer has confirmed which SIZE they want (120cm, 140cm, 160cm, 180cm, etc.)
- When a customer asks about price, you MUST first ask them which size/dimensions they need.
- Only AFTER the customer specifies a size, provide the price for that ONE specific size.
- Do NOT list multiple sizes with their prices. Ask for the size first, then give the single matching price.
- This rule applies to ALL price-related questions — no exceptions.";

pub fn build_system_prompt(
    profile: &AgentProfile,
    language: Language,
    context: &ReplyContext,
) -> String {
    let mut sections = Vec::new();

    let identity =
        if profile.description.is_empty() { DEFAULT_IDENTITY } else { &profile.description };
    sections.push(format!("You are {identity}."));

    match language {
        Language::Ar => sections.push(
            "The customer is writing in Arabic. Respond ONLY in Egyptian Arabic (not formal Arabic)."
                .to_string(),
        ),
        Language::En => sections
            .push("The customer is writing in English. Respond ONLY in English.".to_string()),
    }
    if let Some(tone) = profile.tone(language) {
        sections.push(format!("Your tone: {tone}"));
    }

    if !profile.allowed_actions.is_empty() {
        sections.push(format!("You are ALLOWED to: {}", profile.allowed_actions.join(", ")));
    }
    if !profile.forbidden_actions.is_empty() {
        sections.push(format!(
            "You are STRICTLY FORBIDDEN from: {}",
            profile.forbidden_actions.join(", ")
        ));
    }

    if profile.kind == AgentKind::Sales {
        sections.push(SALES_PRICING_RULE.to_string());
    }

    if !profile.escalation_rules.conditions.is_empty() {
        let rules = profile
            .escalation_rules
            .conditions
            .iter()
            .map(|condition| format!("- {} (priority: {})", condition.trigger, condition.priority))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "If any of these conditions are met, tell the customer you will connect them with a specialist:\n{rules}"
        ));
    }

    if !profile.response_templates.is_empty() {
        let templates = profile
            .response_templates
            .keys()
            .filter_map(|key| {
                profile
                    .template_text(key, language)
                    .map(|text| format!("{key}: \"{text}\""))
            })
            .collect::<Vec<_>>()
            .join("\n");
        if !templates.is_empty() {
            sections
                .push(format!("Use these as STYLE reference (do not copy verbatim):\n{templates}"));
        }
    }

    let products = context
        .products
        .iter()
        .filter(|product| product.is_active && !product.name_en.is_empty())
        .map(|product| {
            format!(
                "- {}: {} EGP, {}, {}-year warranty, category: {}",
                product.localized_name(language),
                format_egp(product.price_egp),
                product.dimensions.as_deref().unwrap_or("N/A"),
                product.warranty_years,
                product.category
            )
        })
        .collect::<Vec<_>>();
    if !products.is_empty() {
        sections.push(format!(
            "CURRENT PRODUCT CATALOG (use ONLY these prices — never invent prices):\n{}",
            products.join("\n")
        ));
    }

    let delivery_rules = context
        .delivery_rules
        .iter()
        .filter(|rule| rule.is_active)
        .map(|rule| {
            format!(
                "- {}: {}-{} days, fee: {} EGP, free above {} EGP",
                rule.localized_region(language),
                rule.delivery_days_min,
                rule.delivery_days_max,
                rule.delivery_fee_egp,
                rule.free_delivery_threshold
            )
        })
        .collect::<Vec<_>>();
    if !delivery_rules.is_empty() {
        sections.push(format!("DELIVERY RULES:\n{}", delivery_rules.join("\n")));
    }

    if !profile.notes.is_empty() {
        let notes =
            profile.notes.iter().map(|note| format!("- {note}")).collect::<Vec<_>>().join("\n");
        sections.push(format!("IMPORTANT NOTES:\n{notes}"));
    }

    let max_length = profile.allowed_outputs.text.max_length.max(1);
    sections.push(format!(
        "OUTPUT RULES:\n- Keep responses under {max_length} characters\n- Respond in plain text only (no markdown formatting, no bullet symbols like *)\n- Use newlines to separate sections\n- Do NOT invent data not provided above\n- Be conversational and helpful"
    ));

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nouma_core::domain::agent::EscalationCondition;
    use nouma_core::{AgentKind, AgentProfile, Language, Product};

    use super::build_system_prompt;
    use crate::generator::ReplyContext;

    fn sales_profile() -> AgentProfile {
        let mut profile = AgentProfile::fallback_support();
        profile.name = "sales".to_string();
        profile.kind = AgentKind::Sales;
        profile.description = "a sales assistant for Nouma Mattresses".to_string();
        profile.allowed_actions = vec!["quote catalog prices".to_string()];
        profile.forbidden_actions = vec!["inventing prices".to_string()];
        profile.escalation_rules.conditions.push(EscalationCondition {
            trigger: "bulk order".to_string(),
            action: "escalate_to_human".to_string(),
            priority: "high".to_string(),
        });
        profile
            .allowed_outputs
            .text
            .tone
            .insert("en".to_string(), "friendly and concise".to_string());
        profile
    }

    fn one_product() -> Product {
        Product {
            id: 1,
            name_en: "Orthopedic Classic 160".to_string(),
            name_ar: None,
            category: "orthopedic".to_string(),
            dimensions: Some("160x195 cm".to_string()),
            material: None,
            firmness_level: None,
            warranty_years: 10,
            description_en: None,
            description_ar: None,
            price_egp: 12_500,
            discount_percent: 0,
            is_active: true,
        }
    }

    #[test]
    fn sales_prompt_carries_the_pricing_rule_and_catalog_facts() {
        let context = ReplyContext { products: vec![one_product()], ..ReplyContext::default() };
        let prompt = build_system_prompt(&sales_profile(), Language::En, &context);

        assert!(prompt.contains("MANDATORY PRICING RULE"));
        assert!(prompt.contains("Orthopedic Classic 160: 12,500 EGP"));
        assert!(prompt.contains("ALLOWED to: quote catalog prices"));
        assert!(prompt.contains("STRICTLY FORBIDDEN from: inventing prices"));
        assert!(prompt.contains("- bulk order (priority: high)"));
        assert!(prompt.contains("Your tone: friendly and concise"));
        assert!(prompt.contains("Respond ONLY in English."));
    }

    #[test]
    fn non_sales_prompt_omits_the_pricing_rule() {
        let profile = AgentProfile::fallback_support();
        let prompt = build_system_prompt(&profile, Language::Ar, &ReplyContext::default());

        assert!(!prompt.contains("MANDATORY PRICING RULE"));
        assert!(prompt.contains("Respond ONLY in Egyptian Arabic"));
    }

    #[test]
    fn templates_are_style_reference_in_requested_language() {
        let mut profile = sales_profile();
        let mut translations = BTreeMap::new();
        translations.insert("en".to_string(), "Which size do you need?".to_string());
        profile.response_templates.insert("ask_for_size".to_string(), translations);

        let prompt = build_system_prompt(&profile, Language::En, &ReplyContext::default());
        assert!(prompt.contains("STYLE reference"));
        assert!(prompt.contains("ask_for_size: \"Which size do you need?\""));
    }

    #[test]
    fn output_rules_use_profile_max_length() {
        let mut profile = sales_profile();
        profile.allowed_outputs.text.max_length = 321;

        let prompt = build_system_prompt(&profile, Language::En, &ReplyContext::default());
        assert!(prompt.contains("under 321 characters"));
    }

    #[test]
    fn inactive_products_are_excluded_from_facts() {
        let mut product = one_product();
        product.is_active = false;
        let context = ReplyContext { products: vec![product], ..ReplyContext::default() };

        let prompt = build_system_prompt(&sales_profile(), Language::En, &context);
        assert!(!prompt.contains("CURRENT PRODUCT CATALOG"));
    }
}
