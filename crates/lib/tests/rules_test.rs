//! # Rule Matcher Tests
//!
//! Verifies which built-in rule answers which question, that literals come only
//! from the schema's value domains, and that every built-in template passes the
//! validator.

use sqlask::rules::{Params, Question, Rule, RuleSet};
use sqlask::{validate, SchemaDescriptor, SetupError};

fn matched(question: &str) -> Option<(&'static str, String)> {
    let rules = RuleSet::builtin().unwrap();
    let schema = SchemaDescriptor::sales();
    rules
        .match_question(&Question::new(question), &schema)
        .map(|m| (m.rule.name, m.sql))
}

fn matched_rule(question: &str) -> Option<&'static str> {
    matched(question).map(|(name, _)| name)
}

#[test]
fn test_questions_route_to_expected_rules() {
    let cases = [
        ("How many products do we have?", "count_products"),
        ("How many electronics products are there?", "category_product_count"),
        ("Show me furniture products", "category_products"),
        ("How many sales have been made?", "count_sales"),
        ("List all products", "list_products"),
        ("Show all sales", "list_sales"),
        ("Which products cost under $100?", "products_below_price"),
        ("Products priced above 500", "products_above_price"),
        ("What is the price of the gaming laptop?", "product_price"),
        ("Which items have the highest price?", "highest_prices"),
        ("What's the cheapest price?", "lowest_prices"),
        ("Show me all prices", "all_prices"),
        ("How many categories are there?", "category_counts"),
        ("What categories do we sell?", "categories"),
        ("What were total sales in the North region?", "sales_in_region"),
        ("Which region has the most sales?", "region_sales"),
        ("List the regions", "regions"),
        ("What is the total quantity sold?", "total_quantity"),
        ("What are the top 5 products?", "top_products"),
        ("How much revenue did we make?", "total_revenue"),
        ("What is the average price of our products?", "average_price"),
        ("What is the average quantity in sales?", "average_quantity"),
        ("What is the total revenue from electronics products?", "total_revenue"),
        ("What is the average price of furniture products?", "average_price"),
        ("What are the top electronics products?", "top_products"),
    ];

    for (question, expected) in cases {
        assert_eq!(
            matched_rule(question),
            Some(expected),
            "question: {question}"
        );
    }
}

#[test]
fn test_every_builtin_rule_is_reachable() {
    let rules = RuleSet::builtin().unwrap();
    assert_eq!(rules.rules().len(), 22);
    assert!(rules.get("average_price").is_some());
    assert!(rules.get("no_such_rule").is_none());
}

#[test]
fn test_literals_are_substituted_from_domains() {
    let (_, sql) = matched("What is the price of the gaming laptop?").unwrap();
    assert_eq!(
        sql,
        "SELECT name, price FROM products WHERE LOWER(name) LIKE '%gaming laptop%'"
    );

    let (_, sql) = matched("What were total sales in the North region?").unwrap();
    assert_eq!(
        sql,
        "SELECT region, SUM(quantity) as total_sales FROM sales WHERE LOWER(region) = 'north' GROUP BY region"
    );

    let (_, sql) = matched("Which products cost under $100?").unwrap();
    assert_eq!(
        sql,
        "SELECT name, price FROM products WHERE price < 100 ORDER BY price ASC"
    );
}

#[test]
fn test_threshold_is_the_number_after_the_comparison() {
    let (name, sql) = matched("Show 3 products under 50 dollars").unwrap();
    assert_eq!(name, "products_below_price");
    assert_eq!(
        sql,
        "SELECT name, price FROM products WHERE price < 50 ORDER BY price ASC"
    );

    let (name, sql) = matched("List 10 products priced above 200").unwrap();
    assert_eq!(name, "products_above_price");
    assert!(sql.contains("price > 200"), "{sql}");
}

#[test]
fn test_category_rules_leave_aggregates_to_other_rules() {
    let (name, sql) = matched("What is the total revenue from electronics products?").unwrap();
    assert_eq!(name, "total_revenue");
    assert!(!sql.contains("category"), "{sql}");

    let (name, _) = matched("What is the average price of furniture products?").unwrap();
    assert_eq!(name, "average_price");

    // A plain listing still filters by category.
    let (name, sql) = matched("Show me accessories products").unwrap();
    assert_eq!(name, "category_products");
    assert!(sql.ends_with("LOWER(category) = 'accessories'"), "{sql}");
}

#[test]
fn test_product_literal_must_be_a_whole_word() {
    let (_, sql) = matched("What is the price of the desktop monitor?").unwrap();
    assert!(sql.contains("'%monitor%'"), "{sql}");

    // "chair" inside "chairman" is not a product mention, so the plain price listing answers.
    assert_eq!(
        matched_rule("What is the price the chairman paid?"),
        Some("all_prices")
    );
}

#[test]
fn test_first_mentioned_literal_wins() {
    let (_, sql) = matched("Compare sales in the west and the east").unwrap();
    assert!(sql.contains("LOWER(region) = 'west'"), "{sql}");
}

#[test]
fn test_region_must_start_a_word() {
    // "east" inside "least" is not a region mention.
    assert_eq!(matched_rule("Which product sold the least?"), None);
}

#[test]
fn test_unmatched_questions_fall_through() {
    assert_eq!(matched_rule("Which products were sold on 2024-03-15?"), None);
    assert_eq!(matched_rule("Who is our best customer?"), None);
    assert_eq!(matched_rule(""), None);
}

#[test]
fn test_matching_is_punctuation_and_case_insensitive() {
    assert_eq!(matched_rule("HOW MANY PRODUCTS???"), Some("count_products"));
    assert_eq!(matched_rule("  how   many products "), Some("count_products"));
}

#[test]
fn test_matching_is_deterministic() {
    let question = "What is the price of the desk lamp?";
    let first = matched(question);
    for _ in 0..10 {
        assert_eq!(matched(question), first);
    }
    assert_eq!(first.map(|(name, _)| name), Some("product_price"));
}

/// A rule's statement that fails validation would be a defect in the rule table,
/// so every built-in template is checked here with representative literals.
#[test]
fn test_every_builtin_template_passes_the_validator() {
    let schema = SchemaDescriptor::sales();
    for rule in RuleSet::builtin().unwrap().rules() {
        let params: Params = rule
            .placeholders()
            .into_iter()
            .map(|key| {
                let value = match key {
                    "product" => "gaming laptop",
                    "category" => "electronics",
                    "region" => "north",
                    "amount" => "100",
                    other => panic!("rule {} uses unexpected placeholder {other}", rule.name),
                };
                (key, value.to_string())
            })
            .collect();
        let sql = rule
            .instantiate(&params)
            .unwrap_or_else(|| panic!("rule {} did not instantiate", rule.name));
        let verdict = validate(&sql, &schema);
        assert!(
            verdict.is_accepted(),
            "rule {} produced rejected SQL ({:?}): {sql}",
            rule.name,
            verdict.reason()
        );
    }
}

fn custom_rule(name: &'static str, template: &'static str) -> Rule {
    Rule {
        name,
        predicate: |_| true,
        extractor: |_, _| Some(Params::new()),
        template,
    }
}

#[test]
fn test_rule_set_rejects_duplicate_names() {
    let result = RuleSet::new(vec![
        custom_rule("a", "SELECT 1"),
        custom_rule("a", "SELECT 2"),
    ]);
    assert!(matches!(result, Err(SetupError::InvalidRule { rule, .. }) if rule == "a"));
}

#[test]
fn test_rule_set_rejects_non_select_templates() {
    let result = RuleSet::new(vec![custom_rule("wipe", "DELETE FROM sales")]);
    assert!(matches!(result, Err(SetupError::InvalidRule { .. })));

    let result = RuleSet::new(vec![custom_rule(
        "two",
        "SELECT * FROM sales; SELECT * FROM products",
    )]);
    assert!(matches!(result, Err(SetupError::InvalidRule { .. })));
}

#[test]
fn test_rule_set_rejects_malformed_placeholders() {
    let result = RuleSet::new(vec![custom_rule(
        "typo",
        "SELECT * FROM sales WHERE LOWER(region) = '{Region}'",
    )]);
    assert!(matches!(result, Err(SetupError::InvalidRule { rule, .. }) if rule == "typo"));

    let result = RuleSet::new(vec![custom_rule(
        "open",
        "SELECT * FROM sales WHERE LOWER(region) = '{region'",
    )]);
    assert!(matches!(result, Err(SetupError::InvalidRule { .. })));
}

#[test]
fn test_custom_rule_set_matches_in_order() {
    let rules = RuleSet::new(vec![
        custom_rule("first", "SELECT COUNT(*) FROM sales"),
        custom_rule("second", "SELECT COUNT(*) FROM products"),
    ])
    .unwrap();
    let schema = SchemaDescriptor::sales();
    let found = rules
        .match_question(&Question::new("anything at all"), &schema)
        .unwrap();
    assert_eq!(found.rule.name, "first");
}
