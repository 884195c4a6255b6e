pub mod orders;
pub mod stock;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Limite e deslocamento da listagem, com os padrões aplicados.
pub(crate) fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (limit.unwrap_or(DEFAULT_PAGE_SIZE), offset.unwrap_or(0))
}
