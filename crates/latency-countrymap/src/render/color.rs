use serde::Serialize;

/// Fill used for countries without any measurement
pub const NO_DATA_COLOR: &str = "lightgrey";

// green, yellow, red as CSS defines them
const ANCHORS: [[f64; 3]; 3] = [[0.0, 128.0, 0.0], [255.0, 255.0, 0.0], [255.0, 0.0, 0.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub from: f64,
    pub to: f64,
    pub color: String,
}

/// Green to red scale over `[vmin, vmax]`, quantized into equal-width bins.
#[derive(Debug, Clone)]
pub struct ColorScale {
    vmin: f64,
    vmax: f64,
    index: Vec<f64>,
    colors: Vec<Rgb>,
}

impl ColorScale {
    pub fn stepped(vmin: f64, vmax: f64, steps: usize) -> Self {
        let n = steps.max(1);
        let index: Vec<f64> = (0..=n)
            .map(|i| vmin + (vmax - vmin) * i as f64 / n as f64)
            .collect();

        let mut scale = Self {
            vmin,
            vmax,
            index,
            colors: Vec::with_capacity(n),
        };

        // The first bin takes the colour of its lower edge and the last bin
        // the colour of its upper edge, so both ends of the scale are exact.
        scale.colors = (0..n)
            .map(|i| {
                let position = if n == 1 {
                    (scale.index[0] + scale.index[1]) / 2.0
                } else {
                    let w = i as f64 / (n - 1) as f64;
                    scale.index[i] * (1.0 - w) + scale.index[i + 1] * w
                };
                scale.linear(position)
            })
            .collect();

        scale
    }

    pub fn steps(&self) -> usize {
        self.colors.len()
    }

    /// Continuous colour at `value`, clamped to the scale range.
    pub fn linear(&self, value: f64) -> Rgb {
        let span = self.vmax - self.vmin;
        let t = if span > 0.0 {
            ((value - self.vmin) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let segments = (ANCHORS.len() - 1) as f64;
        let scaled = t * segments;
        let k = (scaled.floor() as usize).min(ANCHORS.len() - 2);
        let frac = scaled - k as f64;

        let channel = |c: usize| {
            let (a, b) = (ANCHORS[k][c], ANCHORS[k + 1][c]);
            (a + (b - a) * frac).round() as u8
        };
        Rgb(channel(0), channel(1), channel(2))
    }

    /// Colour of the bin `value` falls in. Bins are closed on the upper edge.
    pub fn color_for(&self, value: f64) -> Rgb {
        let below = self.index.iter().filter(|&&edge| edge < value).count();
        if below == 0 {
            self.colors[0]
        } else if below >= self.index.len() {
            self.colors[self.colors.len() - 1]
        } else {
            self.colors[below - 1]
        }
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.colors
            .iter()
            .enumerate()
            .map(|(i, color)| LegendEntry {
                from: self.index[i],
                to: self.index[i + 1],
                color: color.hex(),
            })
            .collect()
    }
}
