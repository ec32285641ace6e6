use crate::error::*;
use crate::output::*;
use crate::util::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputRecord<S> {
    pub time: f64,
    pub position: usize,
    pub value: S,
}

/// Keeps every emitted point, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySink<S> {
    records: Vec<OutputRecord<S>>,
}

impl<S> Default for MemorySink<S> {
    fn default() -> Self {
        MemorySink {
            records: Vec::new(),
        }
    }
}

impl<S: FieldState> MemorySink<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[OutputRecord<S>] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OutputRecord<S>> {
        self.records
    }

    /// Output times, in order of first appearance.
    pub fn times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = Vec::new();
        for r in &self.records {
            if times.last() != Some(&r.time) {
                times.push(r.time);
            }
        }
        times
    }

    /// Values emitted at `time`, sorted by global position.
    pub fn frame(&self, time: f64) -> Vec<(usize, S)> {
        let mut frame: Vec<(usize, S)> = self
            .records
            .iter()
            .filter(|r| r.time == time)
            .map(|r| (r.position, r.value))
            .collect();
        frame.sort_by_key(|(p, _)| *p);
        frame
    }
}

impl<S: FieldState> SolutionSink<S> for MemorySink<S> {
    fn emit(
        &mut self,
        value: &S,
        time: f64,
        local_index: usize,
        global_offset: usize,
    ) -> Result<()> {
        self.records.push(OutputRecord {
            time,
            position: global_position(local_index, global_offset),
            value: *value,
        });
        Ok(())
    }
}

/// Feed recorded points into another sink, for example to merge the
/// records of every rank into one file.
pub fn replay<'a, S, O, I>(records: I, sink: &mut O) -> Result<()>
where
    S: FieldState,
    O: SolutionSink<S> + ?Sized,
    I: IntoIterator<Item = &'a OutputRecord<S>>,
{
    for r in records {
        // local index 1 with the position as offset addresses the same point
        sink.emit(&r.value, r.time, 1, r.position)?;
    }
    Ok(())
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn positions_and_frames() {
        let mut sink: MemorySink<f64> = MemorySink::new();
        // two partitions, offsets 0 and 3, interior of 3 each
        for time in [0.5, 1.0] {
            for k in 1..=3 {
                sink.emit(&(k as f64 * time), time, k, 3).unwrap();
                sink.emit(&(k as f64), time, k, 0).unwrap();
            }
        }
        assert_eq!(sink.records().len(), 12);
        assert_eq!(sink.times(), vec![0.5, 1.0]);

        let frame = sink.frame(1.0);
        let positions: Vec<usize> = frame.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(frame[3], (3, 1.0));
        assert_eq!(frame[5], (5, 3.0));
        assert!(sink.frame(0.75).is_empty());
    }

    #[test]
    fn replay_keeps_positions() {
        let mut a: MemorySink<f64> = MemorySink::new();
        a.emit(&1.0f64, 0.1, 2, 10).unwrap();
        a.emit(&2.0f64, 0.1, 1, 4).unwrap();
        let mut b: MemorySink<f64> = MemorySink::new();
        replay(a.records(), &mut b).unwrap();
        assert_eq!(a, b);
    }
}
