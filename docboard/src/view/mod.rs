mod state;

pub use state::{
    FilterValue, Pagination, SortDirection, SortKey, TableState, ViewMode, DEFAULT_PAGE_SIZE,
    PAGE_SIZE_OPTIONS,
};

use crate::document::Document;
use crate::error::{DocboardError, Result};
use crate::schema::{Accessor, CellValue, ColumnDefinition, FilterKind, SortComparator, TableSchema};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A column as it is presented to the table header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnView {
    pub id: String,
    pub label: String,
    pub sortable: bool,
    pub filterable: bool,
    pub sorted: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub id: String,
    pub selected: bool,
    /// One cell per entry of `VisibleRows::columns`
    pub cells: Vec<CellValue>,
}

/// The derived output of the engine for the current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleRows {
    pub columns: Vec<ColumnView>,
    pub rows: Vec<Row>,
    pub page_index: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub filtered_count: usize,
    pub total_count: usize,
    pub selection_summary: String,
}

/// A distinct value present in a column, for filter option lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    /// The value a filter matches against (reviewer id for the reviewer column)
    pub value: String,
    pub label: String,
    pub count: usize,
}

/// Client-side table over a snapshot of the document collection.
///
/// Rows are derived on every read: filter, then sort, then paginate. The
/// snapshot itself is never reordered or modified.
pub struct ViewEngine {
    schema: TableSchema,
    mode: ViewMode,
    state: TableState,
    data: Arc<Vec<Document>>,
}

impl ViewEngine {
    /// Build an engine for a validated schema. Compact mode keeps only the
    /// schema's compact columns.
    pub fn new(schema: TableSchema, mode: ViewMode) -> Result<Self> {
        schema.validate()?;
        let schema = match mode {
            ViewMode::Full => schema,
            ViewMode::Compact => schema.compact(),
        };
        Ok(ViewEngine {
            schema,
            mode,
            state: TableState::default(),
            data: Arc::new(Vec::new()),
        })
    }

    /// Replace the source snapshot. Selection is kept by document id.
    pub fn set_data(&mut self, data: Arc<Vec<Document>>) {
        self.data = data;
    }

    pub fn data(&self) -> &Arc<Vec<Document>> {
        &self.data
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    fn column(&self, id: &str) -> Result<&ColumnDefinition> {
        self.schema.require_column(id)
    }

    fn ensure_full(&self, what: &str) -> Result<()> {
        match self.mode {
            ViewMode::Full => Ok(()),
            ViewMode::Compact => Err(DocboardError::Unsupported(format!(
                "{what} is not available in compact mode"
            ))),
        }
    }

    /// Edit and delete affordances exist only in the full table.
    pub fn require_row_actions(&self) -> Result<()> {
        self.ensure_full("Row actions")
    }

    // ── Sorting ─────────────────────────────────────────────────────

    pub fn set_sorting(&mut self, sorting: Vec<SortKey>) -> Result<()> {
        let mut seen = BTreeSet::new();
        for key in &sorting {
            if !self.column(&key.column)?.is_sortable() {
                return Err(DocboardError::Schema(format!(
                    "Column '{}' is not sortable",
                    key.column
                )));
            }
            if !seen.insert(key.column.as_str()) {
                return Err(DocboardError::Validation(format!(
                    "Column '{}' appears twice in the sort order",
                    key.column
                )));
            }
        }
        log::debug!("sorting set to {sorting:?}");
        self.state.sorting = sorting;
        Ok(())
    }

    pub fn sort_direction(&self, column: &str) -> Option<SortDirection> {
        self.state
            .sorting
            .iter()
            .find(|k| k.column == column)
            .map(|k| k.direction)
    }

    /// Make `column` the only sort key: descending if it is currently
    /// ascending, ascending otherwise.
    pub fn toggle_sorting(&mut self, column: &str) -> Result<SortDirection> {
        self.ensure_full("Sort toggling")?;
        let direction = match self.sort_direction(column) {
            Some(SortDirection::Asc) => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        self.set_sorting(vec![SortKey {
            column: column.to_string(),
            direction,
        }])?;
        Ok(direction)
    }

    pub fn clear_sorting(&mut self) {
        self.state.sorting.clear();
    }

    // ── Filters ─────────────────────────────────────────────────────

    /// Set or clear a column filter. `None` or an empty value removes it.
    pub fn set_filter(&mut self, column: &str, value: Option<FilterValue>) -> Result<()> {
        let definition = self.column(column)?;
        let kind = match (definition.accessor, definition.filter) {
            (Some(_), Some(kind)) => kind,
            _ => {
                return Err(DocboardError::Schema(format!(
                    "Column '{column}' is not filterable"
                )))
            }
        };

        let value = match value {
            Some(v) if !v.is_empty() => v,
            _ => {
                log::debug!("filter on '{column}' cleared");
                self.state.filters.remove(column);
                return Ok(());
            }
        };

        match (kind, &value) {
            (FilterKind::Contains, FilterValue::Text(_)) => {}
            (FilterKind::OneOf | FilterKind::ReviewerIn, FilterValue::Values(_)) => {}
            (FilterKind::Contains, _) => {
                return Err(DocboardError::Validation(format!(
                    "Column '{column}' filters on text, not a value set"
                )))
            }
            _ => {
                return Err(DocboardError::Validation(format!(
                    "Column '{column}' filters on a value set, not text"
                )))
            }
        }

        log::debug!("filter on '{column}' set to {value:?}");
        self.state.filters.insert(column.to_string(), value);
        Ok(())
    }

    pub fn filter(&self, column: &str) -> Option<&FilterValue> {
        self.state.filters.get(column)
    }

    pub fn clear_filters(&mut self) {
        self.state.filters.clear();
    }

    /// Whether `doc` passes every active filter, optionally ignoring one column.
    fn matches(&self, doc: &Document, skip: Option<&str>) -> bool {
        self.state
            .filters
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != skip)
            .all(|(id, value)| {
                let Some(column) = self.schema.column(id) else {
                    return true;
                };
                match (column.accessor, column.filter) {
                    (Some(accessor), Some(kind)) => filter_matches(kind, accessor, doc, value),
                    _ => true,
                }
            })
    }

    fn filtered(&self) -> Vec<&Document> {
        self.data.iter().filter(|d| self.matches(d, None)).collect()
    }

    // ── Visibility ──────────────────────────────────────────────────

    pub fn set_column_visibility(&mut self, column: &str, visible: bool) -> Result<()> {
        let hideable = self.column(column)?.hideable;
        if visible {
            self.state.hidden.remove(column);
        } else if !hideable {
            return Err(DocboardError::Validation(format!(
                "Column '{column}' cannot be hidden"
            )));
        } else {
            self.state.hidden.insert(column.to_string());
        }
        Ok(())
    }

    pub fn is_column_visible(&self, column: &str) -> bool {
        self.schema.column(column).is_some() && !self.state.hidden.contains(column)
    }

    pub fn visible_columns(&self) -> Vec<&ColumnDefinition> {
        self.schema
            .columns
            .iter()
            .filter(|c| !self.state.hidden.contains(&c.id))
            .collect()
    }

    /// Data columns the user may show or hide.
    pub fn hideable_columns(&self) -> Vec<&ColumnDefinition> {
        self.schema
            .columns
            .iter()
            .filter(|c| c.accessor.is_some() && c.hideable)
            .collect()
    }

    // ── Derivation ──────────────────────────────────────────────────

    /// Filtered and sorted rows, before pagination.
    fn sorted(&self) -> Vec<&Document> {
        let rows = self.filtered();
        let keys: Vec<(Accessor, SortComparator, SortDirection)> = self
            .state
            .sorting
            .iter()
            .filter_map(|k| {
                let column = self.schema.column(&k.column)?;
                Some((column.accessor?, column.sort?, k.direction))
            })
            .collect();
        if keys.is_empty() {
            return rows;
        }

        let mut decorated: Vec<(Vec<CellValue>, &Document)> = rows
            .into_iter()
            .map(|doc| (keys.iter().map(|(a, _, _)| a.value(doc)).collect(), doc))
            .collect();
        decorated.sort_by(|(a, _), (b, _)| {
            keys.iter()
                .zip(a.iter().zip(b.iter()))
                .map(|(&(_, comparator, direction), (x, y))| {
                    compare_cells(x, y, comparator, direction)
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        decorated.into_iter().map(|(_, doc)| doc).collect()
    }

    fn page_bounds(&self, filtered_len: usize) -> (usize, usize) {
        let size = self.state.pagination.page_size;
        let count = page_count(filtered_len, size);
        let index = self.state.pagination.page_index.min(count - 1);
        (index, count)
    }

    /// Rows of the current page, after filtering and sorting.
    pub fn page_rows(&self) -> Vec<&Document> {
        let sorted = self.sorted();
        let (index, _) = self.page_bounds(sorted.len());
        let size = self.state.pagination.page_size;
        sorted.into_iter().skip(index * size).take(size).collect()
    }

    /// The full derived view: visible columns and the rows of the current page.
    pub fn rows(&self) -> VisibleRows {
        let columns: Vec<&ColumnDefinition> = self
            .visible_columns()
            .into_iter()
            .filter(|c| c.accessor.is_some())
            .collect();

        let sorted = self.sorted();
        let filtered_count = sorted.len();
        let (page_index, page_count) = self.page_bounds(filtered_count);
        let page_size = self.state.pagination.page_size;

        let rows = sorted
            .into_iter()
            .skip(page_index * page_size)
            .take(page_size)
            .map(|doc| Row {
                id: doc.id.clone(),
                selected: self.state.selection.contains(&doc.id),
                cells: columns
                    .iter()
                    .filter_map(|c| c.accessor)
                    .map(|a| a.value(doc))
                    .collect(),
            })
            .collect();

        VisibleRows {
            columns: columns
                .iter()
                .map(|c| ColumnView {
                    id: c.id.clone(),
                    label: c.label().to_string(),
                    sortable: c.is_sortable(),
                    filterable: c.is_filterable(),
                    sorted: self.sort_direction(&c.id),
                })
                .collect(),
            rows,
            page_index,
            page_count,
            page_size,
            filtered_count,
            total_count: self.data.len(),
            selection_summary: self.selection_summary(),
        }
    }

    /// Distinct values of a column with counts, over rows passing every
    /// filter except the column's own.
    pub fn facets(&self, column: &str) -> Result<Vec<Facet>> {
        let accessor = self.column(column)?.accessor.ok_or_else(|| {
            DocboardError::Schema(format!("Column '{column}' has no values to facet"))
        })?;

        let mut facets: BTreeMap<String, Facet> = BTreeMap::new();
        for doc in self.data.iter().filter(|d| self.matches(d, Some(column))) {
            let Some(key) = accessor.filter_key(doc) else {
                continue;
            };
            let label = accessor.value(doc).as_key().unwrap_or_else(|| key.clone());
            facets
                .entry(key.clone())
                .or_insert_with(|| Facet {
                    value: key,
                    label,
                    count: 0,
                })
                .count += 1;
        }
        Ok(facets.into_values().collect())
    }

    // ── Pagination ──────────────────────────────────────────────────

    pub fn pagination(&self) -> Pagination {
        self.state.pagination
    }

    /// Current page index, clamped to the last page of the filtered rows.
    pub fn page_index(&self) -> usize {
        self.page_bounds(self.filtered().len()).0
    }

    pub fn page_count(&self) -> usize {
        page_count(self.filtered().len(), self.state.pagination.page_size)
    }

    pub fn set_page_index(&mut self, index: usize) {
        let last = self.page_count() - 1;
        self.state.pagination.page_index = index.min(last);
    }

    /// Change the page size, keeping the first row of the current page in view.
    pub fn set_page_size(&mut self, size: usize) -> Result<()> {
        if !PAGE_SIZE_OPTIONS.contains(&size) {
            return Err(DocboardError::Validation(format!(
                "Page size {size} is not one of {PAGE_SIZE_OPTIONS:?}"
            )));
        }
        let top_row = self.page_index() * self.state.pagination.page_size;
        self.state.pagination = Pagination {
            page_index: top_row / size,
            page_size: size,
        };
        Ok(())
    }

    pub fn can_previous_page(&self) -> bool {
        self.page_index() > 0
    }

    pub fn can_next_page(&self) -> bool {
        self.page_index() + 1 < self.page_count()
    }

    pub fn previous_page(&mut self) {
        let index = self.page_index();
        self.set_page_index(index.saturating_sub(1));
    }

    pub fn next_page(&mut self) {
        let index = self.page_index();
        self.set_page_index(index + 1);
    }

    pub fn first_page(&mut self) {
        self.set_page_index(0);
    }

    pub fn last_page(&mut self) {
        let last = self.page_count() - 1;
        self.set_page_index(last);
    }

    // ── Selection ───────────────────────────────────────────────────

    pub fn is_selected(&self, id: &str) -> bool {
        self.state.selection.contains(id)
    }

    pub fn set_row_selected(&mut self, id: &str, selected: bool) -> Result<()> {
        self.ensure_full("Row selection")?;
        if selected {
            self.state.selection.insert(id.to_string());
        } else {
            self.state.selection.remove(id);
        }
        Ok(())
    }

    /// Flip the selection of one row, returning the new state.
    pub fn toggle_row_selected(&mut self, id: &str) -> Result<bool> {
        let selected = !self.is_selected(id);
        self.set_row_selected(id, selected)?;
        Ok(selected)
    }

    /// Select or deselect every row on the current page.
    pub fn toggle_all_page_rows_selected(&mut self, selected: bool) -> Result<()> {
        self.ensure_full("Row selection")?;
        let ids: Vec<String> = self.page_rows().iter().map(|d| d.id.clone()).collect();
        for id in ids {
            if selected {
                self.state.selection.insert(id);
            } else {
                self.state.selection.remove(&id);
            }
        }
        Ok(())
    }

    pub fn is_all_page_rows_selected(&self) -> bool {
        let page = self.page_rows();
        !page.is_empty() && page.iter().all(|d| self.is_selected(&d.id))
    }

    pub fn is_some_page_rows_selected(&self) -> bool {
        let page = self.page_rows();
        let selected = page.iter().filter(|d| self.is_selected(&d.id)).count();
        selected > 0 && selected < page.len()
    }

    pub fn clear_selection(&mut self) {
        self.state.selection.clear();
    }

    /// Selected rows that pass the current filters.
    pub fn selected_rows(&self) -> Vec<&Document> {
        self.filtered()
            .into_iter()
            .filter(|d| self.is_selected(&d.id))
            .collect()
    }

    pub fn selection_summary(&self) -> String {
        let filtered = self.filtered();
        let selected = filtered.iter().filter(|d| self.is_selected(&d.id)).count();
        format!("{selected} of {} row(s) selected.", filtered.len())
    }
}

fn page_count(rows: usize, page_size: usize) -> usize {
    rows.div_ceil(page_size.max(1)).max(1)
}

fn filter_matches(kind: FilterKind, accessor: Accessor, doc: &Document, value: &FilterValue) -> bool {
    match (kind, value) {
        (FilterKind::Contains, FilterValue::Text(needle)) => {
            let needle = needle.to_lowercase();
            accessor
                .value(doc)
                .as_key()
                .is_some_and(|text| text.to_lowercase().contains(&needle))
        }
        (FilterKind::OneOf | FilterKind::ReviewerIn, FilterValue::Values(set)) => accessor
            .filter_key(doc)
            .is_some_and(|key| set.contains(&key)),
        _ => true,
    }
}

/// Empty cells sort after every value regardless of direction.
fn compare_cells(
    a: &CellValue,
    b: &CellValue,
    comparator: SortComparator,
    direction: SortDirection,
) -> Ordering {
    let ord = match (a, b) {
        (CellValue::Empty, CellValue::Empty) => return Ordering::Equal,
        (CellValue::Empty, _) => return Ordering::Greater,
        (_, CellValue::Empty) => return Ordering::Less,
        (CellValue::Number(x), CellValue::Number(y)) => x.cmp(y),
        (CellValue::Text(x), CellValue::Text(y)) => match comparator {
            SortComparator::Text => x.to_lowercase().cmp(&y.to_lowercase()).then_with(|| x.cmp(y)),
            SortComparator::Numeric => x.cmp(y),
        },
        (CellValue::Number(_), CellValue::Text(_)) => Ordering::Less,
        (CellValue::Text(_), CellValue::Number(_)) => Ordering::Greater,
    };
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}
