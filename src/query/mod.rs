// Telemetry is a submodule of query
pub mod telemetry;

// Submodules for separation of concerns
pub mod cursor;
pub mod eval;
pub mod exec;
pub mod fetch;
mod filter;
pub mod normalize;
pub mod paging;
pub mod parse;
pub mod predicate;
pub mod render;
pub mod translate;
pub mod truth;
pub mod types;

// Public API re-exports
pub use cursor::BatchCursor;
pub use eval::{CompiledFilter, Evaluator, eval_filter};
pub use fetch::{FetchPlan, JoinTree};
pub use normalize::{normalize_numeric_text, normalize_value};
pub use paging::{DrivingQueryPager, OffsetPager, Page, PagingMode, select_mode};
pub use parse::{FilterSerde, parse_fetch_joins, parse_filter_json};
pub use predicate::{Predicate, QueryShape, SelectQuery};
pub use render::{RenderedQuery, render};
pub use telemetry::{MetricsSnapshot, QueryMetrics};
pub use translate::QueryTranslator;
pub use types::{
    CmpOp, Divisor, FetchJoinInformation, Filter, FilterKind, JoinType, PageRequest,
    SortDirection, SortOrder, SortOrders,
};
