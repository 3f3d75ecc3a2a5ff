//! Demo catalog seeding for local development and smoke tests.

use serde::Serialize;

use crate::DbPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub products: u64,
    pub delivery_rules: u64,
}

struct ProductSeed {
    name_en: &'static str,
    name_ar: &'static str,
    category: &'static str,
    dimensions: &'static str,
    material: &'static str,
    firmness_level: &'static str,
    warranty_years: i64,
    description_en: &'static str,
    description_ar: &'static str,
    price_egp: i64,
    discount_percent: i64,
}

const PRODUCT_SEEDS: &[ProductSeed] = &[
    ProductSeed {
        name_en: "Orthopedic Classic 120",
        name_ar: "أورثوبيديك كلاسيك 120",
        category: "orthopedic",
        dimensions: "120x195 cm",
        material: "high-density foam",
        firmness_level: "firm",
        warranty_years: 10,
        description_en: "Firm support designed for your back",
        description_ar: "دعم قوي مصمم لظهرك",
        price_egp: 9_500,
        discount_percent: 0,
    },
    ProductSeed {
        name_en: "Orthopedic Classic 160",
        name_ar: "أورثوبيديك كلاسيك 160",
        category: "orthopedic",
        dimensions: "160x195 cm",
        material: "high-density foam",
        firmness_level: "firm",
        warranty_years: 10,
        description_en: "Firm support designed for your back",
        description_ar: "دعم قوي مصمم لظهرك",
        price_egp: 12_500,
        discount_percent: 0,
    },
    ProductSeed {
        name_en: "Memory Cloud 160",
        name_ar: "ميموري كلاود 160",
        category: "memory_foam",
        dimensions: "160x195 cm",
        material: "memory foam",
        firmness_level: "medium",
        warranty_years: 12,
        description_en: "Contours to your body for ultimate comfort",
        description_ar: "بتاخد شكل جسمك لراحة فائقة",
        price_egp: 15_900,
        discount_percent: 5,
    },
    ProductSeed {
        name_en: "Super Soft Breeze 180",
        name_ar: "سوبر سوفت بريز 180",
        category: "soft",
        dimensions: "180x200 cm",
        material: "soft foam",
        firmness_level: "soft",
        warranty_years: 8,
        description_en: "Exceptional softness for light sleepers",
        description_ar: "نعومة استثنائية للنوم الخفيف",
        price_egp: 14_200,
        discount_percent: 0,
    },
    ProductSeed {
        name_en: "Pillow Top Protector",
        name_ar: "غطاء حماية للمرتبة",
        category: "accessories",
        dimensions: "160x195 cm",
        material: "cotton blend",
        firmness_level: "n/a",
        warranty_years: 1,
        description_en: "Waterproof mattress protector",
        description_ar: "غطاء مضاد للمياه",
        price_egp: 950,
        discount_percent: 0,
    },
];

struct DeliveryRuleSeed {
    region: &'static str,
    governorate: &'static str,
    delivery_days_min: i64,
    delivery_days_max: i64,
    delivery_fee_egp: i64,
    free_delivery_threshold: i64,
    notes_en: &'static str,
    notes_ar: &'static str,
}

const DELIVERY_RULE_SEEDS: &[DeliveryRuleSeed] = &[
    DeliveryRuleSeed {
        region: "Cairo",
        governorate: "القاهرة",
        delivery_days_min: 1,
        delivery_days_max: 3,
        delivery_fee_egp: 0,
        free_delivery_threshold: 5_000,
        notes_en: "Free above 5,000 EGP",
        notes_ar: "مجاني فوق 5,000 جنيه",
    },
    DeliveryRuleSeed {
        region: "Giza",
        governorate: "الجيزة",
        delivery_days_min: 1,
        delivery_days_max: 4,
        delivery_fee_egp: 0,
        free_delivery_threshold: 5_000,
        notes_en: "Free above 5,000 EGP",
        notes_ar: "مجاني فوق 5,000 جنيه",
    },
    DeliveryRuleSeed {
        region: "Alexandria",
        governorate: "الإسكندرية",
        delivery_days_min: 2,
        delivery_days_max: 5,
        delivery_fee_egp: 150,
        free_delivery_threshold: 8_000,
        notes_en: "Standard fee applies",
        notes_ar: "رسوم توصيل عادية",
    },
];

/// Inserts the demo catalog into an empty database. A database that already
/// has products is left untouched.
pub async fn seed_demo_catalog(pool: &DbPool) -> Result<SeedSummary, sqlx::Error> {
    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM products").fetch_one(pool).await?;
    if existing > 0 {
        return Ok(SeedSummary { products: 0, delivery_rules: 0 });
    }

    let mut products = 0u64;
    for seed in PRODUCT_SEEDS {
        let result = sqlx::query(
            "INSERT INTO products (\
                name_en, name_ar, category, dimensions, material, firmness_level, \
                warranty_years, description_en, description_ar, price_egp, \
                discount_percent, is_active\
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(seed.name_en)
        .bind(seed.name_ar)
        .bind(seed.category)
        .bind(seed.dimensions)
        .bind(seed.material)
        .bind(seed.firmness_level)
        .bind(seed.warranty_years)
        .bind(seed.description_en)
        .bind(seed.description_ar)
        .bind(seed.price_egp)
        .bind(seed.discount_percent)
        .execute(pool)
        .await?;
        products += result.rows_affected();
    }

    let mut delivery_rules = 0u64;
    for seed in DELIVERY_RULE_SEEDS {
        let result = sqlx::query(
            "INSERT INTO delivery_rules (\
                region, governorate, delivery_days_min, delivery_days_max, \
                delivery_fee_egp, free_delivery_threshold, notes_en, notes_ar, is_active\
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(seed.region)
        .bind(seed.governorate)
        .bind(seed.delivery_days_min)
        .bind(seed.delivery_days_max)
        .bind(seed.delivery_fee_egp)
        .bind(seed.free_delivery_threshold)
        .bind(seed.notes_en)
        .bind(seed.notes_ar)
        .execute(pool)
        .await?;
        delivery_rules += result.rows_affected();
    }

    Ok(SeedSummary { products, delivery_rules })
}

#[cfg(test)]
mod tests {
    use super::seed_demo_catalog;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = seed_demo_catalog(&pool).await.expect("first seed");
        assert_eq!(first.products, 5);
        assert_eq!(first.delivery_rules, 3);

        let second = seed_demo_catalog(&pool).await.expect("second seed");
        assert_eq!(second.products, 0);
        assert_eq!(second.delivery_rules, 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&pool)
            .await
            .expect("count products");
        assert_eq!(count, 5);
    }
}
