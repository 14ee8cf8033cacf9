// Copyright (c) Recovery Bench Developers.
use anyhow::{bail, Context, Result};
use log::debug;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(u64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<u64> for Field {
    fn from(v: u64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Field {
    fn from(v: u32) -> Self {
        Self::Int(v as u64)
    }
}

impl From<usize> for Field {
    fn from(v: usize) -> Self {
        Self::Int(v as u64)
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

/// Sweep coordinates followed by derived scalars, in the order the bench
/// declares them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow(Vec<Field>);

impl DataRow {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn field<T: Into<Field>>(mut self, v: T) -> Self {
        self.0.push(v.into());
        self
    }

    pub fn fields<T: Into<Field>, I: IntoIterator<Item = T>>(mut self, vs: I) -> Self {
        self.0.extend(vs.into_iter().map(Into::into));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for DataRow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for field in self.0.iter() {
            if !first {
                write!(f, "\t")?;
            }
            first = false;
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Data(DataRow),
    // Keeps the position of a sweep point which wasn't measured. Written as
    // `width` zero fields so the plotting side sees a well-formed line.
    Placeholder { width: usize },
}

impl From<DataRow> for Row {
    fn from(row: DataRow) -> Self {
        Self::Data(row)
    }
}

pub struct RowWriter<W: Write> {
    out: W,
    nr_rows: usize,
}

impl<W: Write> RowWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, nr_rows: 0 }
    }

    pub fn nr_rows(&self) -> usize {
        self.nr_rows
    }

    pub fn write<R: Into<Row>>(&mut self, row: R) -> Result<()> {
        let line = match row.into() {
            Row::Data(row) => format!("{}", &row),
            Row::Placeholder { width } => vec!["0"; width.max(1)].join("\t"),
        };
        debug!("rows: {}", &line);
        writeln!(self.out, "{}", &line)?;
        self.out.flush()?;
        self.nr_rows += 1;
        Ok(())
    }

    pub fn section_break(&mut self, nr_lines: usize) -> Result<()> {
        if nr_lines < 1 || nr_lines > 2 {
            bail!("section break must be 1 or 2 lines, not {}", nr_lines);
        }
        for _ in 0..nr_lines {
            writeln!(self.out)?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn comment(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "# {}", text)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Opens `path` for rows, truncating it unless `append`. Missing parent
/// directories are created.
pub fn open_rows<P: AsRef<Path>>(path: P, append: bool) -> Result<RowWriter<BufWriter<fs::File>>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        rc_util::ensure_dir(parent)?;
    }
    let f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("opening {:?}", path))?;
    Ok(RowWriter::new(BufWriter::new(f)))
}

#[cfg(test)]
mod tests {
    use super::{open_rows, DataRow, Row, RowWriter};
    use std::fs;

    #[test]
    fn test_rows_and_section_break() {
        let mut w = RowWriter::new(Vec::<u8>::new());
        for i in 1..=3u64 {
            w.write(DataRow::new().field(i).field(i * 1000)).unwrap();
        }
        w.section_break(1).unwrap();
        w.write(DataRow::new().field(4u64).field(0.5)).unwrap();
        w.write(DataRow::new().field(5u64).field(12.25)).unwrap();
        assert_eq!(w.nr_rows(), 5);

        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(out, "1\t1000\n2\t2000\n3\t3000\n\n4\t0.5\n5\t12.25\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.iter().filter(|l| l.len() > 0).count(), 5);
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_placeholder_and_comment() {
        let mut w = RowWriter::new(Vec::<u8>::new());
        w.comment("objectSize: 128").unwrap();
        w.write(Row::Placeholder { width: 2 }).unwrap();
        w.section_break(2).unwrap();
        assert!(w.section_break(3).is_err());
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(out, "# objectSize: 128\n0\t0\n\n\n");
    }

    #[test]
    fn test_open_truncate_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery/backup_scale.data");

        let mut w = open_rows(&path, false).unwrap();
        w.write(DataRow::new().field(1u64)).unwrap();
        // Rows are on disk as soon as they are written.
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\n");
        drop(w);

        let mut w = open_rows(&path, true).unwrap();
        w.write(DataRow::new().field(2u64)).unwrap();
        drop(w);
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\n2\n");

        let mut w = open_rows(&path, false).unwrap();
        w.write(DataRow::new().field(3u64)).unwrap();
        drop(w);
        assert_eq!(fs::read_to_string(&path).unwrap(), "3\n");
    }
}
