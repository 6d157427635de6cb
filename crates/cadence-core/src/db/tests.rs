//! Database layer tests

use chrono::NaiveDate;

use super::*;
use crate::db::{MerchantSearch, NewMerchantRule, TransactionFilter, TransactionInsert};
use crate::models::{Frequency, NewMerchant, NewPattern, PatternType};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn netflix() -> NewMerchant {
    NewMerchant {
        original_name: "NETFLIX.COM*1234".to_string(),
        normalized_name: "Netflix".to_string(),
        category: "Entertainment".to_string(),
        sub_category: Some("Streaming Service".to_string()),
        confidence: 0.95,
        flags: vec!["subscription".to_string()],
    }
}

fn pattern_for(merchant_id: i64, confidence: f64) -> NewPattern {
    NewPattern {
        pattern_type: PatternType::Subscription,
        merchant_id,
        amount: 19.99,
        frequency: Frequency::Monthly,
        confidence,
        next_expected_date: Some(date("2024-03-03")),
        description: Some("Fixed monthly charge".to_string()),
        transaction_count: 2,
        average_interval: Some(31.0),
    }
}

mod merchants {
    use super::*;

    #[test]
    fn test_create_and_get_merchant() {
        let db = Database::in_memory().unwrap();

        let created = db.create_merchant(&netflix()).unwrap();
        assert_eq!(created.normalized_name, "Netflix");
        assert!(created.is_active);

        let fetched = db.get_merchant(created.id).unwrap().unwrap();
        assert_eq!(fetched.category, "Entertainment");
        assert_eq!(fetched.flags, vec!["subscription"]);
    }

    #[test]
    fn test_create_merchant_rejects_duplicates() {
        let db = Database::in_memory().unwrap();
        db.create_merchant(&netflix()).unwrap();

        let err = db.create_merchant(&netflix()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let db = Database::in_memory().unwrap();

        let first = db.find_or_create_merchant(&netflix()).unwrap();
        let second = db.find_or_create_merchant(&netflix()).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_find_by_normalized_name() {
        let db = Database::in_memory().unwrap();
        db.create_merchant(&netflix()).unwrap();

        assert!(db
            .find_merchant_by_normalized_name("Netflix")
            .unwrap()
            .is_some());
        assert!(db
            .find_merchant_by_normalized_name("Hulu")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_search_merchants() {
        let db = Database::in_memory().unwrap();
        db.create_merchant(&netflix()).unwrap();
        db.create_merchant(&NewMerchant {
            original_name: "WHOLEFDS #123".to_string(),
            normalized_name: "Whole Foods".to_string(),
            category: "Groceries".to_string(),
            sub_category: None,
            confidence: 0.9,
            flags: vec![],
        })
        .unwrap();

        let (by_category, total) = db
            .search_merchants(&MerchantSearch {
                category: Some("entertainment".to_string()),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_category[0].normalized_name, "Netflix");

        let (by_query, _) = db
            .search_merchants(&MerchantSearch {
                query: Some("whole".to_string()),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_query.len(), 1);
        assert_eq!(by_query[0].normalized_name, "Whole Foods");
    }

    #[test]
    fn test_deactivate_merchant() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        db.deactivate_merchant(merchant.id).unwrap();

        let fetched = db.get_merchant(merchant.id).unwrap().unwrap();
        assert!(!fetched.is_active);

        let (active_only, _) = db
            .search_merchants(&MerchantSearch {
                is_active: Some(true),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert!(active_only.is_empty());
    }
}

mod transactions {
    use super::*;

    fn insert<'a>(merchant_id: Option<i64>, description: &'a str, amount: f64, d: &str) -> (TransactionInsert<'a>, NaiveDate) {
        let parsed = date(d);
        (
            TransactionInsert {
                merchant_id,
                description,
                amount,
                date: parsed,
                category: Some("Entertainment"),
                sub_category: None,
                confidence: Some(0.9),
                is_subscription: true,
                flags: &[],
            },
            parsed,
        )
    }

    #[test]
    fn test_insert_and_get_transaction() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        let (row, d) = insert(Some(merchant.id), "NETFLIX.COM", -19.99, "2024-01-01");
        let result = db.insert_transaction(&row).unwrap();
        let id = match result {
            TransactionInsertResult::Inserted(id) => id,
            other => panic!("Expected insert, got {:?}", other),
        };

        let tx = db.get_transaction(id).unwrap().unwrap();
        assert_eq!(tx.date, d);
        assert_eq!(tx.amount, -19.99);
        assert_eq!(tx.merchant_id, Some(merchant.id));
        assert!(tx.is_subscription);
    }

    #[test]
    fn test_duplicate_detection_by_hash() {
        let db = Database::in_memory().unwrap();

        let (row, _) = insert(None, "NETFLIX.COM", -19.99, "2024-01-01");
        let first = db.insert_transaction(&row).unwrap();
        let second = db.insert_transaction(&row).unwrap();

        match (first, second) {
            (TransactionInsertResult::Inserted(a), TransactionInsertResult::Duplicate(b)) => {
                assert_eq!(a, b)
            }
            other => panic!("Expected insert then duplicate, got {:?}", other),
        }
    }

    #[test]
    fn test_list_transactions_filters() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        for (desc, amount, d) in [
            ("NETFLIX.COM", -19.99, "2024-01-01"),
            ("NETFLIX.COM", -19.99, "2024-02-01"),
            ("SPOTIFY USA", -9.99, "2024-01-15"),
        ] {
            let merchant_id = desc.contains("NETFLIX").then_some(merchant.id);
            let (row, _) = insert(merchant_id, desc, amount, d);
            db.insert_transaction(&row).unwrap();
        }

        let (by_merchant, total) = db
            .list_transactions(&TransactionFilter {
                merchant_id: Some(merchant.id),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(total, 2);
        // Newest first
        assert_eq!(by_merchant[0].date, date("2024-02-01"));

        let (by_date, _) = db
            .list_transactions(&TransactionFilter {
                start_date: Some(date("2024-01-10")),
                end_date: Some(date("2024-01-31")),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_date.len(), 1);
        assert_eq!(by_date[0].description, "SPOTIFY USA");

        let (by_search, _) = db
            .list_transactions(&TransactionFilter {
                search: Some("spotify".to_string()),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_search.len(), 1);
    }
}

mod rules {
    use super::*;

    fn rule(pattern: &str, priority: i64) -> NewMerchantRule {
        NewMerchantRule {
            pattern: pattern.to_string(),
            normalized_name: "Netflix".to_string(),
            category: "Entertainment".to_string(),
            sub_category: None,
            confidence: 1.0,
            priority,
        }
    }

    #[test]
    fn test_create_rule_validates_pattern() {
        let db = Database::in_memory().unwrap();
        assert!(db.create_merchant_rule(&rule("^NETFLIX", 0)).is_ok());
        assert!(db.create_merchant_rule(&rule("([unclosed", 0)).is_err());
    }

    #[test]
    fn test_create_rule_validates_confidence() {
        let db = Database::in_memory().unwrap();
        let mut bad = rule("^NETFLIX", 0);
        bad.confidence = 1.5;
        assert!(db.create_merchant_rule(&bad).is_err());
    }

    #[test]
    fn test_rules_listed_in_priority_order() {
        let db = Database::in_memory().unwrap();
        db.create_merchant_rule(&rule("LOW", 1)).unwrap();
        db.create_merchant_rule(&rule("HIGH", 100)).unwrap();
        db.create_merchant_rule(&rule("MID", 50)).unwrap();

        let rules = db.list_merchant_rules().unwrap();
        let priorities: Vec<i64> = rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![100, 50, 1]);
    }

    #[test]
    fn test_deactivated_rules_excluded_from_scan_order() {
        let db = Database::in_memory().unwrap();
        let r = db.create_merchant_rule(&rule("^NETFLIX", 0)).unwrap();

        db.set_merchant_rule_active(r.id, false).unwrap();
        assert!(db.list_merchant_rules().unwrap().is_empty());
        assert_eq!(db.list_all_merchant_rules().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_rule() {
        let db = Database::in_memory().unwrap();
        let r = db.create_merchant_rule(&rule("^NETFLIX", 0)).unwrap();

        db.delete_merchant_rule(r.id).unwrap();
        assert!(db.get_merchant_rule(r.id).unwrap().is_none());
        assert!(db.delete_merchant_rule(r.id).is_err());
    }
}

mod patterns {
    use super::*;

    #[test]
    fn test_create_and_get_pattern() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        let saved = db.create_pattern(&pattern_for(merchant.id, 0.9)).unwrap();
        assert_eq!(saved.pattern_type, PatternType::Subscription);
        assert_eq!(saved.frequency, Frequency::Monthly);
        assert_eq!(saved.next_expected_date, Some(date("2024-03-03")));

        let fetched = db.get_pattern(saved.id).unwrap().unwrap();
        assert_eq!(fetched.amount, 19.99);
    }

    #[test]
    fn test_create_pattern_rejects_bad_confidence() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        assert!(db.create_pattern(&pattern_for(merchant.id, 1.2)).is_err());
        assert!(db.create_pattern(&pattern_for(merchant.id, -0.1)).is_err());
    }

    #[test]
    fn test_create_pattern_requires_merchant() {
        let db = Database::in_memory().unwrap();
        assert!(db.create_pattern(&pattern_for(999, 0.9)).is_err());
    }

    #[test]
    fn test_patterns_are_append_only() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        // Re-analyzing the same window inserts a new row every time
        db.create_pattern(&pattern_for(merchant.id, 0.9)).unwrap();
        db.create_pattern(&pattern_for(merchant.id, 0.9)).unwrap();

        assert_eq!(db.find_patterns_by_merchant(merchant.id).unwrap().len(), 2);
    }

    #[test]
    fn test_find_by_merchant_ordered_by_confidence() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        db.create_pattern(&pattern_for(merchant.id, 0.5)).unwrap();
        db.create_pattern(&pattern_for(merchant.id, 0.9)).unwrap();

        let patterns = db.find_patterns_by_merchant(merchant.id).unwrap();
        assert_eq!(patterns[0].confidence, 0.9);
        assert_eq!(patterns[1].confidence, 0.5);
    }

    #[test]
    fn test_create_invalidates_cached_listing() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();

        db.create_pattern(&pattern_for(merchant.id, 0.5)).unwrap();
        // Prime the read-through cache
        assert_eq!(db.find_patterns_by_merchant(merchant.id).unwrap().len(), 1);

        // A new pattern must appear immediately, not after TTL expiry
        db.create_pattern(&pattern_for(merchant.id, 0.9)).unwrap();
        assert_eq!(db.find_patterns_by_merchant(merchant.id).unwrap().len(), 2);
        assert_eq!(db.list_patterns().unwrap().len(), 2);
    }

    #[test]
    fn test_prune_patterns() {
        let db = Database::in_memory().unwrap();
        let merchant = db.create_merchant(&netflix()).unwrap();
        db.create_pattern(&pattern_for(merchant.id, 0.9)).unwrap();

        // Nothing is older than 30 days
        assert_eq!(db.prune_patterns_older_than(30).unwrap(), 0);

        // Backdate the row, then prune
        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE patterns SET created_at = '2020-01-01 00:00:00'",
            [],
        )
        .unwrap();
        drop(conn);

        assert_eq!(db.prune_patterns_older_than(30).unwrap(), 1);
        assert!(db.find_patterns_by_merchant(merchant.id).unwrap().is_empty());
    }
}

mod analysis_cache {
    use super::*;

    #[test]
    fn test_cache_set_get_del() {
        let db = Database::in_memory().unwrap();

        db.cache_set("test:key", &vec!["a", "b"], 3600).unwrap();
        let cached: Option<Vec<String>> = db.cache_get("test:key").unwrap();
        assert_eq!(cached, Some(vec!["a".to_string(), "b".to_string()]));

        db.cache_del("test:key").unwrap();
        let gone: Option<Vec<String>> = db.cache_get("test:key").unwrap();
        assert!(gone.is_none());
    }

    #[test]
    fn test_cache_miss_for_unknown_key() {
        let db = Database::in_memory().unwrap();
        let missing: Option<String> = db.cache_get("nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_cache_overwrite_on_set() {
        let db = Database::in_memory().unwrap();

        db.cache_set("k", &1i64, 3600).unwrap();
        db.cache_set("k", &2i64, 3600).unwrap();
        assert_eq!(db.cache_get::<i64>("k").unwrap(), Some(2));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let db = Database::in_memory().unwrap();

        // Negative TTL expires immediately
        db.cache_set("k", &1i64, -10).unwrap();
        assert_eq!(db.cache_get::<i64>("k").unwrap(), None);
    }

    #[test]
    fn test_cleanup_expired() {
        let db = Database::in_memory().unwrap();

        db.cache_set("stale", &1i64, -10).unwrap();
        db.cache_set("fresh", &2i64, 3600).unwrap();

        assert_eq!(db.cache_cleanup_expired().unwrap(), 1);
        assert_eq!(db.cache_get::<i64>("fresh").unwrap(), Some(2));
    }
}
