//! Result-list pagination.

use crate::wire::Pagination;

/// Slices `rows` to page `page` of size `row` (1-based).
///
/// The returned envelope reports the full row count as `total` and the length of the returned
/// slice as `row`, which is smaller than the requested size on the last page and zero past it.
pub fn paginate<T>(rows: Vec<T>, page: usize, row: usize) -> (Pagination, Vec<T>) {
    let total = rows.len();
    let start = page.saturating_sub(1).saturating_mul(row);
    let data: Vec<T> = rows.into_iter().skip(start).take(row).collect();

    let pagination = Pagination {
        page,
        row: data.len(),
        total,
    };
    (pagination, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_slices_and_reports_slice_length() {
        let rows: Vec<u32> = (0..25).collect();

        let (pagination, data) = paginate(rows.clone(), 1, 10);
        assert_eq!(data, (0..10).collect::<Vec<_>>());
        assert_eq!(pagination, Pagination { page: 1, row: 10, total: 25 });

        let (pagination, data) = paginate(rows.clone(), 3, 10);
        assert_eq!(data, (20..25).collect::<Vec<_>>());
        assert_eq!(pagination.row, 5, "row is the slice length, not the page size");
        assert_eq!(pagination.total, 25);

        let (pagination, data) = paginate(rows, 4, 10);
        assert!(data.is_empty());
        assert_eq!(pagination, Pagination { page: 4, row: 0, total: 25 });
    }

    #[test]
    fn test_paginate_huge_page_does_not_overflow() {
        let (pagination, data) = paginate(vec![1, 2, 3], usize::MAX, usize::MAX);
        assert!(data.is_empty());
        assert_eq!(pagination.total, 3);
    }
}
