use std::path::PathBuf;

/// One query against a loaded workspace. Filters are JSON (see `parse_filter_json`), sorts
/// are `name:desc,age` specs and fetch joins are `orders:inner,address` specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Count {
        entity: String,
        filter_json: Option<String>,
        distinct: bool,
    },
    Find {
        entity: String,
        filter_json: Option<String>,
        sort: Option<String>,
    },
    Ids {
        entity: String,
        filter_json: Option<String>,
        sort: Option<String>,
        max_results: Option<usize>,
    },
    Page {
        entity: String,
        filter_json: Option<String>,
        sort: Option<String>,
        joins: Option<String>,
        page: usize,
        size: usize,
    },
    Get {
        entity: String,
        id: String,
        joins: Option<String>,
    },
    Unique {
        entity: String,
        property: String,
        value_json: String,
        ignore_case: bool,
        joins: Option<String>,
    },
    Distinct {
        entity: String,
        property: String,
        filter_json: Option<String>,
        sort: Option<String>,
    },
    CollectionValues {
        entity: String,
        table: String,
        property: String,
    },
    Export {
        entity: String,
        filter_json: Option<String>,
        sort: Option<String>,
        joins: Option<String>,
        batch_size: Option<usize>,
        file: Option<PathBuf>,
    },
    Explain {
        entity: String,
        filter_json: Option<String>,
        sort: Option<String>,
        joins: Option<String>,
        page: usize,
        size: usize,
    },
}
