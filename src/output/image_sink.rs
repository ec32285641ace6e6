use crate::error::*;
use crate::output::*;
use crate::util::*;

/// Space-time picture of a 1D run, one image row per output event.
/// `project` maps a state to the plotted scalar, `range` to the colormap
/// ends, values outside are clamped.
pub struct ImageSink<S, F: Fn(&S) -> f64> {
    width: usize,
    range: (f64, f64),
    project: F,
    rows: Vec<(f64, Vec<f64>)>,
    _state: std::marker::PhantomData<fn(&S)>,
}

impl<S: FieldState, F: Fn(&S) -> f64> ImageSink<S, F> {
    /// `width` is the number of global points.
    pub fn new(width: usize, range: (f64, f64), project: F) -> Self {
        ImageSink {
            width,
            range,
            project,
            rows: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    pub fn lines(&self) -> usize {
        self.rows.len()
    }

    fn row_for(&mut self, time: f64) -> &mut Vec<f64> {
        let tolerance = 1e-9 * time.abs().max(1.0);
        let i = match self
            .rows
            .iter()
            .position(|(t, _)| (t - time).abs() <= tolerance)
        {
            Some(i) => i,
            None => {
                self.rows.push((time, vec![self.range.0; self.width]));
                self.rows.len() - 1
            }
        };
        &mut self.rows[i].1
    }

    fn normalized(&self, v: f64) -> f64 {
        let (lo, hi) = self.range;
        if hi <= lo {
            return 0.0;
        }
        ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
    }

    pub fn to_image(&self) -> image::RgbImage {
        let gradient = colorous::TURBO;
        let mut img =
            image::RgbImage::new(self.width as u32, self.rows.len() as u32);
        for (l, (_, row)) in self.rows.iter().enumerate() {
            for (x, v) in row.iter().enumerate() {
                let c = gradient.eval_continuous(self.normalized(*v));
                img.put_pixel(x as u32, l as u32, image::Rgb(c.as_array()));
            }
        }
        img
    }

    pub fn write<P: AsRef<std::path::Path>>(&self, path: &P) -> Result<()> {
        if self.rows.is_empty() || self.width == 0 {
            return Err(SolverError::Config(
                "nothing to draw, no output events were recorded".to_string(),
            ));
        }
        tracing::info!(path = ?path.as_ref(), lines = self.rows.len(), "writing image");
        self.to_image().save(path)?;
        Ok(())
    }
}

impl<S: FieldState, F: Fn(&S) -> f64> SolutionSink<S> for ImageSink<S, F> {
    fn emit(
        &mut self,
        value: &S,
        time: f64,
        local_index: usize,
        global_offset: usize,
    ) -> Result<()> {
        let position = global_position(local_index, global_offset);
        if position >= self.width {
            return Err(SolverError::Layout(format!(
                "point {position} outside of an image {} wide",
                self.width
            )));
        }
        let v = (self.project)(value);
        self.row_for(time)[position] = v;
        Ok(())
    }
}
