//! # Rule Matcher
//!
//! An ordered list of deterministic question shapes, each with a parameter
//! extractor and a SQL template. The first rule whose predicate holds *and* whose
//! extractor finds every literal it needs wins, so more specific rules must come
//! before general ones.
//!
//! Literals are never parsed out of free text: they are looked up in the schema's
//! value domains (or, for price thresholds, taken from a numeric token). A question
//! mentioning an unknown product simply does not match a product rule.

use crate::{errors::SetupError, schema::SchemaDescriptor};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"));

/// Lower-cases, trims and replaces punctuation with spaces, collapsing runs of
/// whitespace. A `.` between two digits is kept so prices survive.
pub fn normalize(raw: &str) -> String {
    let chars: Vec<char> = raw.trim().to_lowercase().chars().collect();
    let mut out = String::with_capacity(chars.len());
    for (i, c) in chars.iter().enumerate() {
        let decimal_point = *c == '.'
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        out.push(if c.is_alphanumeric() || decimal_point {
            *c
        } else {
            ' '
        });
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A question in normalized form, ready for keyword tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    raw: String,
    normalized: String,
}

impl Question {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            normalized: normalize(raw),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Plain substring containment, so "product" also matches "products".
    pub fn contains(&self, phrase: &str) -> bool {
        self.normalized.contains(&normalize(phrase))
    }

    pub fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.contains(p))
    }

    /// Whole-word containment, so "top" does not match "laptop".
    pub fn has_phrase(&self, phrase: &str) -> bool {
        format!(" {} ", self.normalized).contains(&format!(" {} ", normalize(phrase)))
    }

    pub fn has_any_phrase(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.has_phrase(p))
    }

    /// Finds the candidate literal mentioned in the question.
    ///
    /// A candidate only counts when it starts at a word boundary ("east" does not
    /// match "least"). When several candidates occur, the earliest occurrence wins;
    /// ties at the same position go to the longer candidate, then to the order of
    /// `candidates`.
    pub fn find_literal<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        candidates
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                let needle = normalize(candidate);
                self.word_start_position(&needle)
                    .map(|position| (position, std::cmp::Reverse(needle.len()), index))
            })
            .min()
            .map(|(_, _, index)| candidates[index].as_str())
    }

    fn word_start_position(&self, needle: &str) -> Option<usize> {
        if needle.is_empty() {
            return None;
        }
        let bytes = self.normalized.as_bytes();
        self.normalized
            .match_indices(needle)
            .map(|(position, _)| position)
            .find(|&position| {
                (position == 0 || bytes[position - 1] == b' ')
                    && self.ends_word(position + needle.len())
            })
    }

    // A literal may end in a plural suffix, nothing longer: "chairs" but not "chairman".
    fn ends_word(&self, end: usize) -> bool {
        let rest = &self.normalized[end..];
        ["", "s", "es"].iter().any(|suffix| {
            rest.strip_prefix(*suffix)
                .is_some_and(|tail| tail.is_empty() || tail.starts_with(' '))
        })
    }

    /// The first number that follows the earliest of `phrases`, so in
    /// "show 3 products under 50" the threshold after "under" is 50.
    pub fn number_after(&self, phrases: &[&str]) -> Option<&str> {
        let tokens: Vec<&str> = self.normalized.split_whitespace().collect();
        let start = phrases
            .iter()
            .filter_map(|phrase| {
                let needle = normalize(phrase);
                let words: Vec<&str> = needle.split_whitespace().collect();
                if words.is_empty() {
                    return None;
                }
                tokens
                    .windows(words.len())
                    .position(|window| window == words.as_slice())
                    .map(|index| index + words.len())
            })
            .min()?;
        tokens[start..].iter().copied().find(|token| is_number(token))
    }
}

fn is_number(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit()) && token.parse::<f64>().is_ok()
}

/// Named literals extracted from a question, keyed by template placeholder.
pub type Params = BTreeMap<&'static str, String>;
pub type Predicate = fn(&Question) -> bool;
pub type Extractor = fn(&Question, &SchemaDescriptor) -> Option<Params>;

/// One deterministic question shape.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub predicate: Predicate,
    pub extractor: Extractor,
    pub template: &'static str,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl Rule {
    /// The placeholder names used by the template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&'static str> {
        PLACEHOLDER_RE
            .captures_iter(self.template)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    /// Renders the template. Literals are quoted-escaped; a missing parameter
    /// yields `None` rather than a half-filled statement.
    pub fn instantiate(&self, params: &Params) -> Option<String> {
        let mut missing = false;
        let sql = PLACEHOLDER_RE.replace_all(self.template, |caps: &Captures| {
            match params.get(&caps[1]) {
                Some(value) => value.replace('\'', "''"),
                None => {
                    missing = true;
                    String::new()
                }
            }
        });
        (!missing).then(|| sql.into_owned())
    }

    /// Runs predicate, extractor and template in turn.
    pub fn apply(&self, question: &Question, schema: &SchemaDescriptor) -> Option<(Params, String)> {
        if !(self.predicate)(question) {
            return None;
        }
        let params = (self.extractor)(question, schema)?;
        let sql = self.instantiate(&params)?;
        Some((params, sql))
    }
}

/// The outcome of a successful match.
#[derive(Debug, Clone)]
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub params: Params,
    pub sql: String,
}

/// The ordered rule list. Order is priority.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// The built-in rules for the sales catalog, checked like any other rule set.
    pub fn builtin() -> Result<Self, SetupError> {
        Self::new(default_rules())
    }

    /// Builds a rule set, rejecting definitions that could never produce a single
    /// read-only statement.
    pub fn new(rules: Vec<Rule>) -> Result<Self, SetupError> {
        let mut names = HashSet::new();
        for rule in &rules {
            let invalid = |message: &str| SetupError::InvalidRule {
                rule: rule.name.to_string(),
                message: message.to_string(),
            };
            if rule.name.trim().is_empty() {
                return Err(invalid("rule name is empty"));
            }
            if !names.insert(rule.name) {
                return Err(invalid("rule name is not unique"));
            }
            let template = rule.template.trim_start().to_ascii_uppercase();
            if !template.starts_with("SELECT") && !template.starts_with("WITH") {
                return Err(invalid("template is not a SELECT statement"));
            }
            if rule.template.contains(';') {
                return Err(invalid("template contains a statement terminator"));
            }
            // Every brace must belong to a `{name}` placeholder, or it would reach the SQL verbatim.
            let braces = rule.template.matches(['{', '}']).count();
            if braces != 2 * rule.placeholders().len() {
                return Err(invalid("template contains a malformed placeholder"));
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Returns the first rule that fully matches the question.
    pub fn match_question(&self, question: &Question, schema: &SchemaDescriptor) -> Option<RuleMatch<'_>> {
        self.rules.iter().find_map(|rule| {
            let (params, sql) = rule.apply(question, schema)?;
            debug!(rule = rule.name, ?params, "Rule matched.");
            Some(RuleMatch { rule, params, sql })
        })
    }
}

// --- Parameter extractors ---

fn no_params(_: &Question, _: &SchemaDescriptor) -> Option<Params> {
    Some(Params::new())
}

fn domain_param(
    question: &Question,
    schema: &SchemaDescriptor,
    table: &str,
    column: &str,
    key: &'static str,
) -> Option<Params> {
    let literal = question.find_literal(schema.domain(table, column)?)?;
    Some(Params::from([(key, literal.to_string())]))
}

fn product_param(question: &Question, schema: &SchemaDescriptor) -> Option<Params> {
    domain_param(question, schema, "products", "name", "product")
}

fn category_param(question: &Question, schema: &SchemaDescriptor) -> Option<Params> {
    domain_param(question, schema, "products", "category", "category")
}

fn region_param(question: &Question, schema: &SchemaDescriptor) -> Option<Params> {
    domain_param(question, schema, "sales", "region", "region")
}

fn amount_after(question: &Question, phrases: &[&str]) -> Option<Params> {
    let amount = question.number_after(phrases)?;
    Some(Params::from([("amount", amount.to_string())]))
}

fn below_amount(question: &Question, _: &SchemaDescriptor) -> Option<Params> {
    amount_after(question, BELOW)
}

fn above_amount(question: &Question, _: &SchemaDescriptor) -> Option<Params> {
    amount_after(question, ABOVE)
}

/// Whether the question asks for an aggregate or a ranking rather than a list.
/// Category rules step aside for these so the aggregate rules can answer.
fn asks_for_aggregate(q: &Question) -> bool {
    q.contains_any(AGGREGATE_TERMS) || q.has_phrase("top")
}

const BELOW: &[&str] = &["under", "below", "cheaper than", "less than"];
const ABOVE: &[&str] = &["over", "above", "more than", "more expensive than"];
const PRICE_SUBJECT: &[&str] = &["price", "product", "cost"];
const AGGREGATE_TERMS: &[&str] = &[
    "revenue", "money", "earned", "average", "price", "cost", "total", "sold", "sales", "quantity",
];

/// The built-in rules for the sales catalog, most specific first.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "category_product_count",
            predicate: |q| {
                q.contains("product") && q.contains_any(&["how many", "count"]) && !asks_for_aggregate(q)
            },
            extractor: category_param,
            template: "SELECT COUNT(*) as product_count FROM products WHERE LOWER(category) = '{category}'",
        },
        Rule {
            name: "category_products",
            predicate: |q| q.contains("product") && !asks_for_aggregate(q),
            extractor: category_param,
            template: "SELECT * FROM products WHERE LOWER(category) = '{category}'",
        },
        Rule {
            name: "count_products",
            predicate: |q| {
                q.contains("how many products") || (q.contains("count") && q.contains("product"))
            },
            extractor: no_params,
            template: "SELECT COUNT(*) as product_count FROM products",
        },
        Rule {
            name: "count_sales",
            predicate: |q| {
                q.contains("how many sales") || (q.contains("count") && q.contains("sales"))
            },
            extractor: no_params,
            template: "SELECT COUNT(*) as sales_count FROM sales",
        },
        Rule {
            name: "list_products",
            predicate: |q| {
                q.contains_any(&["show all products", "list all products", "all products"])
            },
            extractor: no_params,
            template: "SELECT * FROM products",
        },
        Rule {
            name: "list_sales",
            predicate: |q| q.contains_any(&["show all sales", "list all sales", "all sales"]),
            extractor: no_params,
            template: "SELECT * FROM sales LIMIT 20",
        },
        Rule {
            name: "products_below_price",
            predicate: |q| q.has_any_phrase(BELOW) && q.contains_any(PRICE_SUBJECT),
            extractor: below_amount,
            template: "SELECT name, price FROM products WHERE price < {amount} ORDER BY price ASC",
        },
        Rule {
            name: "products_above_price",
            predicate: |q| q.has_any_phrase(ABOVE) && q.contains_any(PRICE_SUBJECT),
            extractor: above_amount,
            template: "SELECT name, price FROM products WHERE price > {amount} ORDER BY price DESC",
        },
        Rule {
            name: "product_price",
            predicate: |q| q.contains("price"),
            extractor: product_param,
            template: "SELECT name, price FROM products WHERE LOWER(name) LIKE '%{product}%'",
        },
        Rule {
            name: "highest_prices",
            predicate: |q| q.contains("price") && q.contains_any(&["highest", "most expensive"]),
            extractor: no_params,
            template: "SELECT name, price FROM products ORDER BY price DESC LIMIT 5",
        },
        Rule {
            name: "lowest_prices",
            predicate: |q| q.contains("price") && q.contains_any(&["lowest", "cheapest"]),
            extractor: no_params,
            template: "SELECT name, price FROM products ORDER BY price ASC LIMIT 5",
        },
        Rule {
            name: "all_prices",
            // "average price" falls through to `average_price`.
            predicate: |q| q.contains("price") && !q.contains("average"),
            extractor: no_params,
            template: "SELECT name, price FROM products ORDER BY price DESC",
        },
        Rule {
            name: "category_counts",
            predicate: |q| q.contains_any(&["category", "categories"]) && q.contains_any(&["how many", "count"]),
            extractor: no_params,
            template: "SELECT category, COUNT(*) as count FROM products GROUP BY category",
        },
        Rule {
            name: "categories",
            predicate: |q| q.contains_any(&["category", "categories"]),
            extractor: no_params,
            template: "SELECT DISTINCT category FROM products",
        },
        Rule {
            name: "sales_in_region",
            predicate: |q| q.contains_any(&["sales", "sold", "quantity"]),
            extractor: region_param,
            template: "SELECT region, SUM(quantity) as total_sales FROM sales WHERE LOWER(region) = '{region}' GROUP BY region",
        },
        Rule {
            name: "region_sales",
            predicate: |q| q.contains("region") && q.contains_any(&["sales", "most", "highest"]),
            extractor: no_params,
            template: "SELECT region, SUM(quantity) as total_sales FROM sales GROUP BY region ORDER BY total_sales DESC",
        },
        Rule {
            name: "regions",
            predicate: |q| q.contains("region"),
            extractor: no_params,
            template: "SELECT DISTINCT region FROM sales",
        },
        Rule {
            name: "total_quantity",
            predicate: |q| q.contains_any(&["total sales", "total quantity"]),
            extractor: no_params,
            template: "SELECT SUM(quantity) as total_quantity FROM sales",
        },
        Rule {
            name: "top_products",
            predicate: |q| q.has_phrase("top") && q.contains("product"),
            extractor: no_params,
            template: "SELECT p.name, SUM(s.quantity) as total_sold FROM products p JOIN sales s ON p.id = s.product_id GROUP BY p.id ORDER BY total_sold DESC LIMIT 5",
        },
        Rule {
            name: "total_revenue",
            predicate: |q| q.contains_any(&["revenue", "money", "earned"]),
            extractor: no_params,
            template: "SELECT SUM(p.price * s.quantity) as total_revenue FROM products p JOIN sales s ON p.id = s.product_id",
        },
        Rule {
            name: "average_price",
            predicate: |q| q.contains("average price"),
            extractor: no_params,
            template: "SELECT AVG(price) as average_price FROM products",
        },
        Rule {
            name: "average_quantity",
            predicate: |q| q.contains("average") && q.contains("sales"),
            extractor: no_params,
            template: "SELECT AVG(quantity) as average_quantity FROM sales",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_but_keeps_decimals() {
        assert_eq!(normalize("  How many PRODUCTS?!  "), "how many products");
        assert_eq!(normalize("Wi-Fi router, under $99.50."), "wi fi router under 99.50");
        assert_eq!(normalize("end."), "end");
    }

    #[test]
    fn test_find_literal_prefers_earliest_then_longest() {
        let candidates = vec!["desk".to_string(), "lamp".to_string(), "desk lamp".to_string()];
        let q = Question::new("price of the lamp and the desk");
        assert_eq!(q.find_literal(&candidates), Some("lamp"));

        let q = Question::new("price of the desk lamp");
        assert_eq!(q.find_literal(&candidates), Some("desk lamp"));
    }

    #[test]
    fn test_find_literal_requires_word_start() {
        let regions = vec!["east".to_string()];
        assert_eq!(Question::new("which product sold the least").find_literal(&regions), None);
        assert_eq!(Question::new("sales in the east").find_literal(&regions), Some("east"));
    }

    #[test]
    fn test_number_after_phrase() {
        assert_eq!(Question::new("products under $100").number_after(BELOW), Some("100"));
        assert_eq!(
            Question::new("show 3 products under 50 dollars").number_after(BELOW),
            Some("50")
        );
        assert_eq!(
            Question::new("portable ssd 1tb more than 49.99").number_after(ABOVE),
            Some("49.99")
        );
        assert_eq!(Question::new("5 cheap things under budget").number_after(BELOW), None);
        assert_eq!(Question::new("cheap things").number_after(BELOW), None);
    }

    #[test]
    fn test_find_literal_allows_only_plural_suffixes() {
        let products = vec!["desk".to_string(), "monitor".to_string(), "chair".to_string()];
        assert_eq!(
            Question::new("price of the desktop monitor").find_literal(&products),
            Some("monitor")
        );
        assert_eq!(Question::new("the chairman and the desk").find_literal(&products), Some("desk"));
        assert_eq!(Question::new("how many chairs").find_literal(&products), Some("chair"));
        assert_eq!(Question::new("all the desks").find_literal(&products), Some("desk"));
    }

    #[test]
    fn test_instantiate_escapes_quotes_and_requires_all_params() {
        let rule = Rule {
            name: "t",
            predicate: |_| true,
            extractor: no_params,
            template: "SELECT * FROM products WHERE name = '{product}'",
        };
        let params = Params::from([("product", "o'neil".to_string())]);
        assert_eq!(
            rule.instantiate(&params).as_deref(),
            Some("SELECT * FROM products WHERE name = 'o''neil'")
        );
        assert_eq!(rule.instantiate(&Params::new()), None);
        assert_eq!(rule.placeholders(), vec!["product"]);
    }
}
