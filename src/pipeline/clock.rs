/// Simulated time, iteration counter and output threshold of one run.
///
/// Time is `advances * dt` rather than a running sum, so a run of `n`
/// advances always lands on the same value no matter how it got there.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    dt: f64,
    substeps_per_advance: usize,
    output_interval: f64,
    iteration: usize,
    advances: usize,
    outputs: usize,
}

impl SimulationClock {
    pub fn new(
        dt: f64,
        substeps_per_advance: usize,
        output_interval: f64,
        start_iteration: usize,
    ) -> Self {
        debug_assert!(substeps_per_advance > 0);
        SimulationClock {
            dt,
            substeps_per_advance,
            output_interval,
            iteration: start_iteration,
            advances: 0,
            outputs: 0,
        }
    }

    pub fn time(&self) -> f64 {
        self.advances as f64 * self.dt
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn advances(&self) -> usize {
        self.advances
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Output fires once time passes this.
    /// A quarter step below the nominal output time so rounding never
    /// pushes a firing one step late.
    pub fn next_output(&self) -> f64 {
        (self.outputs + 1) as f64 * self.output_interval - 0.25 * self.dt
    }

    /// End of one iteration.
    /// Returns whether simulated time moved.
    pub fn tick(&mut self) -> bool {
        let advanced = (self.iteration + 1) % self.substeps_per_advance == 0;
        if advanced {
            self.advances += 1;
        }
        self.iteration += 1;
        advanced
    }

    pub fn output_due(&self) -> bool {
        self.time() > self.next_output()
    }

    /// Move the threshold one interval on.
    pub fn mark_output(&mut self) {
        self.outputs += 1;
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn advances_every_iteration() {
        let mut clock = SimulationClock::new(0.01, 1, 0.02, 0);
        let mut previous = clock.time();
        for i in 1..=1000 {
            assert!(clock.tick());
            assert!(clock.time() >= previous);
            assert_approx_eq!(f64, clock.time(), i as f64 * 0.01);
            previous = clock.time();
        }
        assert_eq!(clock.iteration(), 1000);
        assert_eq!(clock.advances(), 1000);
    }

    #[test]
    fn substep_cadence() {
        let mut clock = SimulationClock::new(0.5, 2, 1.0, 0);
        assert!(!clock.tick());
        assert_eq!(clock.time(), 0.0);
        assert!(clock.tick());
        assert_eq!(clock.time(), 0.5);
        assert!(!clock.tick());
        assert!(clock.tick());
        assert_eq!(clock.time(), 1.0);
        assert_eq!(clock.iteration(), 4);

        // cadence follows the absolute counter
        let mut clock = SimulationClock::new(0.5, 2, 1.0, 1);
        assert!(clock.tick());
        assert_eq!(clock.iteration(), 2);
    }

    #[test]
    fn output_threshold() {
        let mut clock = SimulationClock::new(0.01, 1, 0.02, 0);
        assert_approx_eq!(f64, clock.next_output(), 0.0175);
        let mut fired = Vec::new();
        while clock.time() < 0.05 {
            clock.tick();
            if clock.output_due() {
                let before = clock.next_output();
                fired.push(clock.time());
                clock.mark_output();
                assert_approx_eq!(f64, clock.next_output() - before, 0.02);
                assert!(!clock.output_due());
            }
        }
        assert_eq!(clock.advances(), 5);
        assert_eq!(fired.len(), 2);
        assert_approx_eq!(f64, fired[0], 0.02);
        assert_approx_eq!(f64, fired[1], 0.04);
    }
}
