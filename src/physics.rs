// Ball seeding and the per-tick bounce.
// Integer physics: a ball moves by (dx, dy) every tick and reflects off the
// surface edges. Nothing here knows about pixels or threads.

use std::ops::Range;

use rand::Rng;

use crate::types::Ball;

/// Create `count` balls that fully fit inside a `width x height` surface.
/// Sizes come from `size` (circles, so h = w); both speed components from `speed`.
/// Callers validate the ranges first (see `Config::validate`).
pub fn seed_balls<R: Rng>(
    rng: &mut R,
    count: usize,
    width: i32,
    height: i32,
    size: Range<i32>,
    speed: Range<i32>,
) -> Vec<Ball> {
    (0..count)
        .map(|_| {
            let w = rng.random_range(size.clone());
            let h = w;
            Ball {
                x: rng.random_range(0..width - w),
                y: rng.random_range(0..height - h),
                w,
                h,
                dx: rng.random_range(speed.clone()),
                dy: rng.random_range(speed.clone()),
            }
        })
        .collect()
}

impl Ball {
    /// Advance one tick inside a `width x height` surface.
    ///
    /// Reaching or overshooting an edge clamps the ball onto it and inverts that
    /// axis' velocity. Axes are handled independently, so a corner hit reflects
    /// both in the same tick.
    pub fn step(&mut self, width: i32, height: i32) {
        self.x += self.dx;
        self.y += self.dy;

        let max_x = width - self.w;
        let max_y = height - self.h;

        if self.x >= max_x {
            self.x = max_x;
            self.dx = -self.dx;
        }
        if self.y >= max_y {
            self.y = max_y;
            self.dy = -self.dy;
        }
        if self.x <= 0 {
            self.x = 0;
            self.dx = -self.dx;
        }
        if self.y <= 0 {
            self.y = 0;
            self.dy = -self.dy;
        }
    }

    /// True if the whole circle lies on the surface.
    pub fn in_bounds(&self, width: i32, height: i32) -> bool {
        (0..=width - self.w).contains(&self.x) && (0..=height - self.h).contains(&self.y)
    }
}

/// Step every ball once.
pub fn step_all(balls: &mut [Ball], width: i32, height: i32) {
    for ball in balls.iter_mut() {
        ball.step(width, height);
    }
}
