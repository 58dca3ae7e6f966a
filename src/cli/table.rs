use std::marker::PhantomData;

use prettytable::{format, Row, Table};

pub trait ToRow {
    fn columns() -> Row;
    fn to_row(&self) -> Row;
}

/// Table of rows sharing one column layout
pub struct OutputTable<T: ToRow> {
    inner: Table,
    rows: usize,
    row_type: PhantomData<T>,
}

impl<T> OutputTable<T>
where
    T: ToRow,
{
    pub fn new() -> Self {
        let format = format::FormatBuilder::new()
            .padding(1, 1)
            .separator(
                format::LinePosition::Title,
                format::LineSeparator::new('-', '+', '+', '+'),
            )
            .build();
        let mut table = Table::new();
        table.set_format(format);
        table.set_titles(T::columns());
        Self {
            inner: table,
            rows: 0,
            row_type: PhantomData,
        }
    }

    pub fn add_row(&mut self, row: &T) {
        self.inner.add_row(row.to_row());
        self.rows += 1;
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn print(&self) {
        self.inner.printstd();
    }
}

impl<T: ToRow> Default for OutputTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
