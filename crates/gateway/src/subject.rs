use crate::Error;

/// Namespace value that disables prefixing.
pub const WILDCARD_NAMESPACE: &str = "*";

/// Separator between a namespace and the subject it prefixes.
pub const NAMESPACE_SEPARATOR: char = ':';

/// How a call's subject is namespaced before it reaches the transport.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Namespacing {
    /// Prefix with the gateway's active namespace, if one is set.
    #[default]
    Active,

    /// Prefix with this namespace instead of the active one.
    Override(String),

    /// Leave the subject as given.
    Bare,
}

/// Joins a stream name and a subject suffix into the stream-scoped subject.
#[must_use]
pub fn combine(stream: &str, subject: &str) -> String {
    format!("{stream}.{subject}")
}

/// Checks that `name` can stand as the first token of a combined subject.
///
/// A stream name must be one subject token: non-empty, without the `.`
/// separator, the `*`/`>` wildcards or whitespace. This keeps [`combine`]
/// injective across streams.
///
/// # Errors
///
/// Returns [`Error::InvalidStreamName`] otherwise.
pub fn validate_stream_name(name: &str) -> Result<(), Error> {
    let invalid = name.is_empty()
        || name
            .chars()
            .any(|c| matches!(c, '.' | '*' | '>') || c.is_whitespace());

    if invalid {
        return Err(Error::InvalidStreamName(name.to_string()));
    }

    Ok(())
}

/// Prefixes `subject` with `namespace`.
///
/// The subject passes through unchanged when there is no namespace, when it
/// is empty, or when it is [`WILDCARD_NAMESPACE`].
#[must_use]
pub fn apply_namespace(subject: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(namespace) if !namespace.is_empty() && namespace != WILDCARD_NAMESPACE => {
            format!("{namespace}{NAMESPACE_SEPARATOR}{subject}")
        }
        _ => subject.to_string(),
    }
}

/// Maps [`combine`] over `subjects`, keeping order and duplicates.
#[must_use]
pub fn generate_subject_names<S: AsRef<str>>(stream: &str, subjects: &[S]) -> Vec<String> {
    subjects
        .iter()
        .map(|subject| combine(stream, subject.as_ref()))
        .collect()
}

/// Union of `existing` and `additional`: existing subjects first, then new
/// ones in input order, each exact string kept once.
#[must_use]
pub fn merge_subjects(existing: &[String], additional: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + additional.len());

    for subject in existing.iter().chain(additional) {
        if !merged.contains(subject) {
            merged.push(subject.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_keeps_components_apart() {
        assert_eq!(combine("ORDERS", "created"), "ORDERS.created");
        assert_ne!(combine("ORDERS", "created"), combine("ORDER", "created"));
        assert_ne!(combine("ORDERS", "created"), combine("ORDERS", "cancelled"));
        assert_eq!(combine("ORDERS", "created"), combine("ORDERS", "created"));
    }

    #[test]
    fn test_dotted_stream_names_are_rejected() {
        // The only way two streams can produce the same combined subject.
        assert_eq!(combine("A.B", "c"), combine("A", "B.c"));

        assert!(validate_stream_name("A").is_ok());
        assert!(matches!(
            validate_stream_name("A.B"),
            Err(Error::InvalidStreamName(name)) if name == "A.B"
        ));
    }

    #[test]
    fn test_validate_stream_name() {
        for name in ["ORDERS", "orders-eu", "ORDERS_2"] {
            assert!(validate_stream_name(name).is_ok(), "{name}");
        }

        for name in ["", "ORDERS.EU", "ORDERS*", "ORDERS>", "ORD ERS", "ORDERS\t"] {
            assert!(validate_stream_name(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn test_apply_namespace() {
        assert_eq!(
            apply_namespace("staff.check", Some("tenant")),
            "tenant:staff.check"
        );
        assert_eq!(apply_namespace("staff.check", Some("*")), "staff.check");
        assert_eq!(apply_namespace("staff.check", Some("")), "staff.check");
        assert_eq!(apply_namespace("staff.check", None), "staff.check");
    }

    #[test]
    fn test_generate_subject_names_preserves_order_and_duplicates() {
        let names = generate_subject_names("ORDERS", &["created", "cancelled", "created"]);

        assert_eq!(
            names,
            vec!["ORDERS.created", "ORDERS.cancelled", "ORDERS.created"]
        );
    }

    #[test]
    fn test_merge_subjects_is_order_stable() {
        let existing = vec!["A.one".to_string(), "A.two".to_string()];
        let additional = vec![
            "A.three".to_string(),
            "A.one".to_string(),
            "A.three".to_string(),
            "a.one".to_string(),
        ];

        assert_eq!(
            merge_subjects(&existing, &additional),
            vec!["A.one", "A.two", "A.three", "a.one"]
        );
    }

    #[test]
    fn test_merge_subjects_with_nothing_new() {
        let existing = vec!["A.one".to_string()];

        assert_eq!(merge_subjects(&existing, &existing), existing);
    }
}
