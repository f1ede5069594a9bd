use super::{EntityCore, SimEntity};
use crate::engine::Schedule;
use crate::types::SimEvent;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};

/// A stochastic arrival process with exponentially distributed
/// interarrival times. Each arrival publishes the running arrival count and
/// the drawn interarrival time.
pub struct ArrivalProcess {
    core: EntityCore,
    rate: f64,
    seed: u64,
    rng: StdRng,
    arrivals: u64,
}

impl ArrivalProcess {
    /// `rate` is the mean number of arrivals per unit of virtual time.
    pub fn new(name: &str, rate: f64, seed: u64) -> Self {
        Self {
            core: EntityCore::new(name),
            rate,
            seed,
            rng: StdRng::seed_from_u64(seed),
            arrivals: 0,
        }
    }

    pub fn arrivals(&self) -> u64 {
        self.arrivals
    }

    fn next_interarrival(&mut self) -> Result<f64, anyhow::Error> {
        let exp = Exp::new(self.rate)
            .map_err(|e| anyhow::anyhow!("invalid arrival rate {}: {}", self.rate, e))?;
        Ok(exp.sample(&mut self.rng))
    }
}

#[async_trait]
impl SimEntity for ArrivalProcess {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    async fn reset(&mut self) {
        self.arrivals = 0;
        // Reseed so every replication draws from a reproducible stream.
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    async fn start_replication(&mut self, schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        let delay = self.next_interarrival()?;
        schedule.schedule_in(delay, "arrival");
        Ok(())
    }

    async fn handle_event(&mut self, event: &SimEvent, schedule: &mut Schedule) -> Result<(), anyhow::Error> {
        match event.name.as_str() {
            "arrival" => {
                self.arrivals += 1;
                let delay = self.next_interarrival()?;
                self.core.publish("count", self.arrivals as f64).await;
                self.core.publish("interarrival", delay).await;
                schedule.schedule_in(delay, "arrival");
                Ok(())
            }
            other => Err(anyhow::anyhow!("unknown event {} for arrival process", other)),
        }
    }
}
