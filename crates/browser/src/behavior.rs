use std::time::Duration;

use rand::Rng;
use tracing::debug;

use juriscrape_core::config::BehaviorConfig;
use juriscrape_core::page::Page;

/// Makes seed-page visits look less mechanical: randomized think-time,
/// mouse drift and incremental scrolling with the occasional scroll-back.
pub struct BehaviorSimulator {
    min_delay: f64,
    max_delay: f64,
    distribution: String,
    mouse_movements: bool,
    scrolling: bool,
}

impl BehaviorSimulator {
    pub fn new(config: &BehaviorConfig) -> Self {
        Self {
            min_delay: config.min_delay.max(0.0),
            max_delay: config.max_delay.max(config.min_delay),
            distribution: config.distribution.clone(),
            mouse_movements: config.mouse_movements,
            scrolling: config.scrolling,
        }
    }

    fn sample_delay(&self, min: f64, max: f64) -> f64 {
        let mut rng = rand::thread_rng();
        let delay = match self.distribution.as_str() {
            "uniform" => rng.gen_range(min..=max),
            "exponential" => {
                let scale = (min + max) / 2.0;
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                -u.ln() * scale
            }
            // Box-Muller, centered between min and max.
            _ => {
                let mean = (min + max) / 2.0;
                let std = (max - min) / 4.0;
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen_range(0.0..1.0);
                mean + std * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
            }
        };
        delay.clamp(min, max)
    }

    pub async fn random_delay(&self) {
        let delay = self.sample_delay(self.min_delay, self.max_delay);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }

    async fn drift_mouse(&self, page: &dyn Page) {
        let moves = rand::thread_rng().gen_range(3..=8);
        for _ in 0..moves {
            let (x, y) = {
                let mut rng = rand::thread_rng();
                (rng.gen_range(0.0..1920.0), rng.gen_range(0.0..1080.0))
            };
            if page.mouse_move(x, y).await.is_err() {
                break;
            }
            let pause = rand::thread_rng().gen_range(0.05..0.2);
            tokio::time::sleep(Duration::from_secs_f64(pause)).await;
        }
    }

    async fn scroll_like_a_reader(&self, page: &dyn Page) {
        let scrolls = rand::thread_rng().gen_range(2..=6);
        let mut position: i64 = 0;
        for i in 0..scrolls {
            position += rand::thread_rng().gen_range(300..=800);
            if page
                .evaluate(&format!("window.scrollTo(0, {position}); null"))
                .await
                .is_err()
            {
                return;
            }
            let read_time = rand::thread_rng().gen_range(0.3..1.5);
            tokio::time::sleep(Duration::from_secs_f64(read_time)).await;

            // Occasionally scroll back up a little.
            if i > 1 && rand::thread_rng().gen_bool(0.2) {
                position = (position - rand::thread_rng().gen_range(100..=300)).max(0);
                let _ = page
                    .evaluate(&format!("window.scrollTo(0, {position}); null"))
                    .await;
                let pause = rand::thread_rng().gen_range(0.2..0.5);
                tokio::time::sleep(Duration::from_secs_f64(pause)).await;
            }
        }
    }

    /// Run one interaction pass over a freshly loaded page.
    pub async fn simulate(&self, page: &dyn Page) {
        self.random_delay_bounded(0.5, 2.0).await;

        if self.mouse_movements && rand::thread_rng().gen_bool(0.7) {
            self.drift_mouse(page).await;
        }
        if self.scrolling && rand::thread_rng().gen_bool(0.6) {
            self.scroll_like_a_reader(page).await;
        }

        self.random_delay_bounded(0.5, 2.0).await;
        debug!(url = %page.url(), "behavior simulation pass done");
    }

    async fn random_delay_bounded(&self, min: f64, max: f64) {
        let delay = self.sample_delay(min, max);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator(distribution: &str) -> BehaviorSimulator {
        BehaviorSimulator::new(&BehaviorConfig {
            simulate_human: true,
            min_delay: 1.0,
            max_delay: 5.0,
            distribution: distribution.to_string(),
            mouse_movements: true,
            scrolling: true,
        })
    }

    #[test]
    fn sampled_delays_stay_in_bounds() {
        for dist in ["uniform", "normal", "exponential"] {
            let sim = simulator(dist);
            for _ in 0..500 {
                let d = sim.sample_delay(1.0, 5.0);
                assert!((1.0..=5.0).contains(&d), "{dist} produced {d}");
            }
        }
    }
}
