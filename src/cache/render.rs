//! Display forms for registry records.
//!
//! Pure functions so that any management transport can reformat names
//! without touching registry state.

use super::record::CacheEntryRecord;

/// Render `name(summary)` for a record.
pub fn name_with_parameters(record: &CacheEntryRecord) -> String {
    format!("{}({})", record.name, record.configuration.summary())
}

/// Render a bracketed, comma-separated list; `[]` when empty.
pub fn bracketed<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = items
        .into_iter()
        .map(|item| item.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::{BasicConfiguration, CacheConfiguration};
    use crate::cache::record::{CacheName, LifecycleState};

    #[test]
    fn renders_name_with_summary() {
        let configuration = BasicConfiguration::default().into_ref();
        let record = CacheEntryRecord {
            name: CacheName::named("a"),
            state: LifecycleState::Defined,
            configuration: configuration.clone(),
        };

        assert_eq!(
            name_with_parameters(&record),
            format!("a({})", configuration.summary())
        );
    }

    #[test]
    fn empty_list_renders_brackets() {
        assert_eq!(bracketed(Vec::<String>::new()), "[]");
        assert_eq!(bracketed(["a(x)", "b(y)"]), "[a(x), b(y)]");
    }
}
