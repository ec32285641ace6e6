use crate::error::*;
use crate::output::*;
use crate::util::*;
use std::io::prelude::*;

/// States that know how to lay themselves out as CSV columns.
pub trait CsvState: FieldState {
    fn columns() -> Vec<String>;

    fn write_fields<W: Write>(&self, output: &mut W) -> std::io::Result<()>;
}

impl CsvState for f64 {
    fn columns() -> Vec<String> {
        vec!["value".to_string()]
    }

    fn write_fields<W: Write>(&self, output: &mut W) -> std::io::Result<()> {
        write!(output, ",{self}")
    }
}

impl<const D: usize> CsvState for nalgebra::SVector<f64, D>
where
    nalgebra::SVector<f64, D>: FieldState,
{
    fn columns() -> Vec<String> {
        (0..D).map(|d| format!("value_{d}")).collect()
    }

    fn write_fields<W: Write>(&self, output: &mut W) -> std::io::Result<()> {
        for v in self.iter() {
            write!(output, ",{v}")?;
        }
        Ok(())
    }
}

/// One `time,position,value...` row per emitted point.
pub struct CsvSink<W: Write> {
    output: W,
    header_written: bool,
}

impl CsvSink<std::io::BufWriter<std::fs::File>> {
    pub fn create<P: AsRef<std::path::Path>>(path: &P) -> Result<Self> {
        tracing::info!(path = ?path.as_ref(), "writing csv");
        let file = std::fs::File::create(path)?;
        Ok(CsvSink::new(std::io::BufWriter::new(file)))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(output: W) -> Self {
        CsvSink {
            output,
            header_written: false,
        }
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.output.flush()?;
        Ok(self.output)
    }
}

impl<S: CsvState, W: Write> SolutionSink<S> for CsvSink<W> {
    fn emit(
        &mut self,
        value: &S,
        time: f64,
        local_index: usize,
        global_offset: usize,
    ) -> Result<()> {
        if !self.header_written {
            writeln!(self.output, "time,position,{}", S::columns().join(","))?;
            self.header_written = true;
        }
        write!(
            self.output,
            "{time},{}",
            global_position(local_index, global_offset)
        )?;
        value.write_fields(&mut self.output)?;
        writeln!(self.output)?;
        Ok(())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn scalar_rows() {
        let mut sink = CsvSink::new(Vec::new());
        sink.emit(&1.5f64, 0.25, 1, 4).unwrap();
        sink.emit(&-2.0f64, 0.25, 2, 4).unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "time,position,value\n0.25,4,1.5\n0.25,5,-2\n");
    }

    #[test]
    fn vector_rows() {
        let mut sink = CsvSink::new(Vec::new());
        sink.emit(&Vector2::new(1.0f64, 0.5), 1.0, 3, 0).unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "time,position,value_0,value_1\n1,2,1,0.5\n");
    }
}
