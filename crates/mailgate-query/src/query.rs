//! Address-book queries: property filters, limits and projection.

use serde::{Deserialize, Serialize};

use crate::card::{AddressObject, Card, FIELD_UID, FIELD_VERSION};
use crate::error::Result;
use crate::text::{FilterTest, TextMatch};

/// Properties every projected card keeps.
const IDENTITY_FIELDS: [&str; 2] = [FIELD_VERSION, FIELD_UID];

/// Filter over one card property.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropFilter {
    /// Property name, e.g. `EMAIL`.
    pub name: String,
    /// Combinator over `text_matches`.
    pub test: FilterTest,
    /// Text-match clauses.
    pub text_matches: Vec<TextMatch>,
    /// Matches only when the property is absent.
    pub is_not_defined: bool,
}

impl PropFilter {
    /// Creates a filter with a single text-match clause.
    #[must_use]
    pub fn new(name: impl Into<String>, text_match: TextMatch) -> Self {
        Self {
            name: name.into(),
            text_matches: vec![text_match],
            ..Self::default()
        }
    }

    /// Evaluates the filter against a card.
    ///
    /// The filter holds when any one occurrence of the property satisfies the
    /// clauses. An explicitly filtered property that is absent evaluates to
    /// false unless `is_not_defined` is set.
    #[must_use]
    pub fn matches(&self, card: &Card) -> bool {
        let fields = card.fields(&self.name);
        if fields.is_empty() {
            return self.is_not_defined;
        }
        if self.is_not_defined {
            return false;
        }
        if self.text_matches.is_empty() {
            return true;
        }
        fields.iter().any(|field| {
            self.test
                .combine(self.text_matches.iter().map(|m| m.matches(&field.value)))
        })
    }
}

/// Which properties to return for matching cards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressDataRequest {
    /// Requested property names.
    pub props: Vec<String>,
    /// Return every property regardless of `props`.
    pub all_prop: bool,
}

impl AddressDataRequest {
    /// Returns true if cards must be projected.
    #[must_use]
    pub fn is_projection(&self) -> bool {
        !self.all_prop && !self.props.is_empty()
    }
}

/// A complete address-book query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressBookQuery {
    /// Properties to return.
    pub data_request: AddressDataRequest,
    /// Combinator across `prop_filters`.
    pub filter_test: FilterTest,
    /// Property filters. An empty list matches every card.
    pub prop_filters: Vec<PropFilter>,
    /// Maximum number of results; zero means unlimited.
    pub limit: usize,
}

impl AddressBookQuery {
    /// Parses a JSON-encoded query, validating every token.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or carries an unknown filter
    /// test, match type or collation.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Evaluates the query against a card.
    #[must_use]
    pub fn matches(&self, card: &Card) -> bool {
        if self.prop_filters.is_empty() {
            return true;
        }
        self.filter_test
            .combine(self.prop_filters.iter().map(|p| p.matches(card)))
    }

    fn project(&self, card: &Card) -> Card {
        let names = self
            .data_request
            .props
            .iter()
            .map(String::as_str)
            .chain(IDENTITY_FIELDS);
        card.project(names)
    }
}

/// Tests a single address object. A missing query matches everything.
#[must_use]
pub fn matches(query: Option<&AddressBookQuery>, object: &AddressObject) -> bool {
    query.is_none_or(|q| q.matches(&object.card))
}

/// Filters address objects, applying the limit and property projection.
///
/// Results keep their input order and evaluation stops once the limit is
/// reached.
#[must_use]
pub fn filter(query: Option<&AddressBookQuery>, objects: &[AddressObject]) -> Vec<AddressObject> {
    let Some(query) = query else {
        return objects.to_vec();
    };

    let limit = match query.limit {
        0 => objects.len(),
        n => n.min(objects.len()),
    };

    let mut out = Vec::with_capacity(limit);
    for object in objects {
        if out.len() >= limit {
            break;
        }
        if !query.matches(&object.card) {
            continue;
        }
        let card = if query.data_request.is_projection() {
            query.project(&object.card)
        } else {
            object.card.clone()
        };
        out.push(AddressObject::new(object.path.clone(), card));
    }

    tracing::trace!(candidates = objects.len(), matched = out.len(), "address-book filter");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use crate::card::{FIELD_EMAIL, FIELD_FORMATTED_NAME, FIELD_NAME};
    use crate::error::FilterError;
    use crate::text::MatchType;
    use proptest::prelude::*;

    fn card(id: u8, name: &str) -> AddressObject {
        let text = format!(
            "BEGIN:VCARD\n\
VERSION:4.0\n\
UID:urn:uuid:4fbe8971-0bc3-424c-9c26-36c3e1eff6b{id}\n\
FN;PID=1.1:{cap} Gopher\n\
N:Gopher;{cap};;;\n\
EMAIL;PID=1.1:{name}@example.com\n\
CLIENTPIDMAP:1;urn:uuid:53e374d9-337e-4727-8803-a1e9c14e055{id}\n\
END:VCARD",
            cap = name[..1].to_uppercase() + &name[1..],
        );
        AddressObject::new(format!("/{name}.vcf"), Card::parse(&text).unwrap())
    }

    fn people() -> Vec<AddressObject> {
        vec![card(1, "alice"), card(2, "bob"), card(3, "carla")]
    }

    fn email_query(matches: Vec<TextMatch>) -> AddressBookQuery {
        AddressBookQuery {
            data_request: AddressDataRequest {
                all_prop: true,
                ..AddressDataRequest::default()
            },
            prop_filters: vec![PropFilter {
                name: FIELD_EMAIL.into(),
                text_matches: matches,
                ..PropFilter::default()
            }],
            ..AddressBookQuery::default()
        }
    }

    fn paths(objects: &[AddressObject]) -> Vec<&str> {
        objects.iter().map(|o| o.path.as_str()).collect()
    }

    #[test]
    fn test_filter_without_query_returns_everything() {
        let all = people();
        assert_eq!(filter(None, &all), all);
    }

    #[test]
    fn test_filter_limits() {
        let all = people();
        let mut query = email_query(vec![TextMatch::contains("example.com")]);
        assert_eq!(filter(Some(&query), &all).len(), 3);

        query.limit = 1;
        assert_eq!(paths(&filter(Some(&query), &all)), ["/alice.vcf"]);

        query.limit = 4;
        assert_eq!(filter(Some(&query), &all), all);
    }

    #[test]
    fn test_filter_email_matches() {
        let all = people();

        let query = email_query(vec![TextMatch::contains("carla")]);
        assert_eq!(paths(&filter(Some(&query), &all)), ["/carla.vcf"]);

        let query = email_query(vec![
            TextMatch::contains("carla@example"),
            TextMatch::contains("alice@example"),
        ]);
        assert_eq!(
            paths(&filter(Some(&query), &all)),
            ["/alice.vcf", "/carla.vcf"]
        );

        let query = email_query(vec![TextMatch::contains("")]);
        assert_eq!(filter(Some(&query), &all).len(), 3);

        let query = email_query(vec![TextMatch::contains("example.org")]);
        assert!(filter(Some(&query), &all).is_empty());
    }

    #[test]
    fn test_filter_projects_properties() {
        let all = people();
        let expected = Card::parse(
            "BEGIN:VCARD\n\
VERSION:4.0\n\
UID:urn:uuid:4fbe8971-0bc3-424c-9c26-36c3e1eff6b3\n\
EMAIL;PID=1.1:carla@example.com\n\
END:VCARD",
        )
        .unwrap();

        for props in [
            vec![FIELD_VERSION, FIELD_UID, FIELD_EMAIL],
            vec![FIELD_UID, FIELD_EMAIL],
        ] {
            let mut query = email_query(vec![TextMatch::contains("carla")]);
            query.data_request = AddressDataRequest {
                props: props.iter().map(ToString::to_string).collect(),
                all_prop: false,
            };
            let got = filter(Some(&query), &all);
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].card, expected);
        }
    }

    fn alice_query(filter_test: FilterTest, prop_filters: Vec<PropFilter>) -> AddressBookQuery {
        AddressBookQuery {
            data_request: AddressDataRequest {
                props: vec![
                    FIELD_FORMATTED_NAME.into(),
                    FIELD_EMAIL.into(),
                    FIELD_UID.into(),
                ],
                all_prop: false,
            },
            filter_test,
            prop_filters,
            limit: 0,
        }
    }

    #[test]
    fn test_match_text_match_types() {
        let alice = card(1, "alice");
        let cases = [
            (TextMatch::contains("example.com"), true),
            (TextMatch::new("alice@example.com", MatchType::Equals), true),
            (TextMatch::new("example.com", MatchType::Equals), false),
            (
                TextMatch::new("bob@example.com", MatchType::Equals).negated(),
                true,
            ),
            (TextMatch::new("alice@", MatchType::StartsWith), true),
            (TextMatch::new("com", MatchType::EndsWith), true),
            (TextMatch::new(".org", MatchType::EndsWith), false),
        ];
        for (text_match, want) in cases {
            let query = alice_query(
                FilterTest::AnyOf,
                vec![PropFilter::new(FIELD_EMAIL, text_match.clone())],
            );
            assert_eq!(matches(Some(&query), &alice), want, "{text_match:?}");
        }
        assert!(matches(None, &alice));
    }

    #[test]
    fn test_match_property_combinators() {
        let alice = card(1, "alice");

        let all_ok = PropFilter {
            name: FIELD_NAME.into(),
            test: FilterTest::AllOf,
            text_matches: vec![TextMatch::contains("Alice"), TextMatch::contains("Gopher")],
            is_not_defined: false,
        };
        assert!(matches(
            Some(&alice_query(FilterTest::AnyOf, vec![all_ok.clone()])),
            &alice
        ));

        let mut all_not = all_ok.clone();
        all_not.text_matches[1] = TextMatch::contains("GopherXXX");
        assert!(!matches(
            Some(&alice_query(FilterTest::AnyOf, vec![all_not])),
            &alice
        ));

        let query = alice_query(
            FilterTest::AllOf,
            vec![
                PropFilter::new(FIELD_NAME, TextMatch::contains("Alice")),
                PropFilter::new(FIELD_NAME, TextMatch::contains("GopherXXX")),
            ],
        );
        assert!(!matches(Some(&query), &alice));
    }

    #[test]
    fn test_missing_properties() {
        let alice = card(1, "alice");

        // Requested for output only: no effect on matching.
        let mut query = alice_query(
            FilterTest::AnyOf,
            vec![PropFilter::new(FIELD_EMAIL, TextMatch::contains("example.com"))],
        );
        query.data_request.props.push("XXX-not-THERE".into());
        assert!(matches(Some(&query), &alice));

        query.data_request.all_prop = true;
        assert!(matches(Some(&query), &alice));

        // Explicitly filtered and absent: that filter fails.
        let query = alice_query(
            FilterTest::AllOf,
            vec![
                PropFilter::new(FIELD_EMAIL, TextMatch::contains("example.com")),
                PropFilter::new("TEL", TextMatch::contains("")),
            ],
        );
        assert!(!matches(Some(&query), &alice));

        // Other satisfied filters still carry an anyof query.
        let query = alice_query(
            FilterTest::AnyOf,
            vec![
                PropFilter::new("TEL", TextMatch::contains("")),
                PropFilter::new(FIELD_EMAIL, TextMatch::contains("example.com")),
            ],
        );
        assert!(matches(Some(&query), &alice));

        let absent = PropFilter {
            name: "TEL".into(),
            is_not_defined: true,
            ..PropFilter::default()
        };
        assert!(matches(
            Some(&alice_query(FilterTest::AnyOf, vec![absent])),
            &alice
        ));
    }

    #[test]
    fn test_empty_prop_filters_match_everything() {
        let query = AddressBookQuery::default();
        assert_eq!(filter(Some(&query), &people()).len(), 3);
    }

    #[test]
    fn test_any_occurrence_may_match() {
        let card = Card::parse(
            "BEGIN:VCARD\nEMAIL:work@example.org\nEMAIL:home@example.com\nEND:VCARD",
        )
        .unwrap();
        let filter = PropFilter::new(FIELD_EMAIL, TextMatch::new("home@", MatchType::StartsWith));
        assert!(filter.matches(&card));
    }

    #[test]
    fn test_from_json() {
        let query = AddressBookQuery::from_json(
            r#"{
                "filter_test": "allof",
                "limit": 2,
                "data_request": {"props": ["EMAIL"]},
                "prop_filters": [{
                    "name": "EMAIL",
                    "text_matches": [{"text": "alice", "match_type": "starts-with"}]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(query.filter_test, FilterTest::AllOf);
        assert_eq!(query.limit, 2);
        assert_eq!(
            query.prop_filters[0].text_matches[0].match_type,
            MatchType::StartsWith
        );
        assert_eq!(paths(&filter(Some(&query), &people())), ["/alice.vcf"]);
    }

    #[test]
    fn test_from_json_rejects_unknown_filter_test() {
        let err = AddressBookQuery::from_json(
            r#"{"filter_test": "XXX-invalid-filter", "prop_filters": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::Malformed(_)));
        assert!(
            err.to_string()
                .contains("unknown query filter test \"XXX-invalid-filter\"")
        );
    }

    fn objects() -> impl Strategy<Value = Vec<AddressObject>> {
        proptest::collection::vec(("[a-z]{1,8}", 0u8..10), 0..8).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(name, id)| card(id, &name))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn empty_contains_matches_every_card(all in objects()) {
            let query = email_query(vec![TextMatch::contains("")]);
            prop_assert_eq!(filter(Some(&query), &all), all);
        }

        #[test]
        fn limited_result_is_a_prefix(all in objects(), needle in "[a-z]{0,2}", limit in 1usize..6) {
            let mut query = email_query(vec![TextMatch::contains(needle)]);
            let unlimited = filter(Some(&query), &all);
            query.limit = limit;
            let limited = filter(Some(&query), &all);
            prop_assert_eq!(&limited[..], &unlimited[..limit.min(unlimited.len())]);
        }

        #[test]
        fn projection_keeps_identity(
            all in objects(),
            props in proptest::sample::subsequence(vec!["FN", "EMAIL", "N", "TEL"], 1..4),
        ) {
            let mut query = email_query(vec![TextMatch::contains("")]);
            query.data_request = AddressDataRequest {
                props: props.iter().map(ToString::to_string).collect(),
                all_prop: false,
            };
            for object in filter(Some(&query), &all) {
                prop_assert!(object.card.contains(FIELD_UID));
                prop_assert!(object.card.contains(FIELD_VERSION));
                prop_assert!(!object.card.contains("CLIENTPIDMAP"));
            }
        }
    }
}
