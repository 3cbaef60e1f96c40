use chartview_warehouse::{Listing, PriceBar};
use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use std::fmt::Write;

////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Candlestick + volume charts, rendered to SVG
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Layout and colours of a chart pane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartStyle {
    pub width: f64,
    pub height: f64,
    /// Fraction of the height given to the volume pane.
    pub volume_share: f64,
    /// Bars of empty space kept right of the latest candle.
    pub right_offset: usize,
    /// Narrowest slot a candle may get; older bars are scrolled out instead.
    pub min_bar_spacing: f64,
    pub background: String,
    pub text: String,
    pub up: String,
    pub down: String,
    pub pivot: String,
    pub font_family: String,
    pub font_size: f64,
    pub currency: String,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 760.0,
            height: 450.0,
            volume_share: 0.2,
            right_offset: 5,
            min_bar_spacing: 10.0,
            background: "#1E222D".to_string(),
            text: "#FFFFFF".to_string(),
            up: "#00ff55".to_string(),
            down: "#ed4807".to_string(),
            pivot: "#227cf4".to_string(),
            font_family: "Helvetica".to_string(),
            font_size: 12.0,
            currency: "₹".to_string(),
        }
    }
}

const PADDING: f64 = 8.0;
const AXIS_WIDTH: f64 = 64.0;
const DATE_AXIS_HEIGHT: f64 = 18.0;

// -------------------------------------------------------------------------------------------------

/// Percentage move between the two most recent closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyChange {
    pub symbol: String,
    pub latest_close: f64,
    pub prior_close: f64,
    pub percent: f64,
}

impl DailyChange {
    pub fn is_up(&self) -> bool {
        self.percent >= 0.0
    }

    pub fn arrow(&self) -> &'static str {
        if self.is_up() {
            "▲"
        } else {
            "▼"
        }
    }
}

/// `None` ("not available") with fewer than two bars, or when the prior close is zero.
pub fn daily_change(series: &[PriceBar]) -> Option<DailyChange> {
    let mut latest: Option<&PriceBar> = None;
    let mut prior: Option<&PriceBar> = None;
    for bar in series {
        if latest.map_or(true, |l| bar.timestamp > l.timestamp) {
            prior = latest;
            latest = Some(bar);
        } else if prior.map_or(true, |p| bar.timestamp > p.timestamp) {
            prior = Some(bar);
        }
    }

    let (latest, prior) = (latest?, prior?);
    if prior.close == 0.0 {
        return None;
    }
    Some(DailyChange {
        symbol: latest.symbol.clone(),
        latest_close: latest.close,
        prior_close: prior.close,
        percent: (latest.close - prior.close) / prior.close * 100.0,
    })
}

// -------------------------------------------------------------------------------------------------

/// Floor-trader pivot levels, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PivotPoints {
    pub p: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

impl PivotPoints {
    pub fn from_hlc(high: f64, low: f64, close: f64) -> Self {
        let pivot = (high + low + close) / 3.0;
        Self {
            p: round2(pivot),
            r1: round2(2.0 * pivot - low),
            r2: round2(pivot + (high - low)),
            r3: round2(high + 2.0 * (pivot - low)),
            s1: round2(2.0 * pivot - high),
            s2: round2(pivot - (high - low)),
            s3: round2(low - 2.0 * (high - pivot)),
        }
    }

    pub fn levels(&self) -> [(&'static str, f64); 7] {
        [
            ("P", self.p),
            ("R1", self.r1),
            ("R2", self.r2),
            ("R3", self.r3),
            ("S1", self.s1),
            ("S2", self.s2),
            ("S3", self.s3),
        ]
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pivots from the calendar month before the latest bar's month (not the wall clock's);
/// `None` if that month has no bars.
pub fn monthly_pivots(series: &[PriceBar]) -> Option<PivotPoints> {
    let latest = series.iter().map(|b| b.timestamp).max()?;
    let this_month = NaiveDate::from_ymd_opt(latest.year(), latest.month(), 1)?;
    let prev_month = this_month.checked_sub_months(Months::new(1))?;

    let mut month: Vec<&PriceBar> = series
        .iter()
        .filter(|b| b.timestamp >= prev_month && b.timestamp < this_month)
        .collect();
    month.sort_by_key(|b| b.timestamp);

    let close = month.last()?.close;
    let high = month.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = month.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    Some(PivotPoints::from_hlc(high, low, close))
}

// -------------------------------------------------------------------------------------------------

/// The figures shown above a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub symbol: String,
    pub name: String,
    pub last_close: f64,
    pub volume: i64,
    pub change: Option<DailyChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub x: f64,
    pub wick_top: f64,
    pub wick_bottom: f64,
    pub body_top: f64,
    pub body_height: f64,
    pub up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeBar {
    pub x: f64,
    pub top: f64,
    pub height: f64,
    pub up: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLine {
    pub label: &'static str,
    pub price: f64,
    pub y: f64,
    pub dashed: bool,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleChart {
    pub header: Header,
    pub style: ChartStyle,
    pub slot: f64,
    pub candles: Vec<Candle>,
    pub volume: Vec<VolumeBar>,
    pub lines: Vec<PriceLine>,
    pub pivots: Option<PivotPoints>,
    pub price_min: f64,
    pub price_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyState {
    pub symbol: String,
    pub name: String,
    pub message: String,
    pub style: ChartStyle,
}

/// Handle of one rendered chart pane.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Chart {
    Candles(CandleChart),
    Empty(EmptyState),
}

/// Lay out `series` (ordered by date) as candles, volume bars, and pivot lines.
///
/// An empty series renders the empty-state placeholder; it is never an error.
pub fn render(listing: &Listing, series: &[PriceBar], style: &ChartStyle) -> Chart {
    let Some(last) = series.last() else {
        return Chart::Empty(EmptyState {
            symbol: listing.symbol.clone(),
            name: listing.name.clone(),
            message: "No price data available".to_string(),
            style: style.clone(),
        });
    };

    let header = Header {
        symbol: listing.symbol.clone(),
        name: listing.name.clone(),
        last_close: last.close,
        volume: last.volume,
        change: daily_change(series),
    };

    // geometry
    let plot_width = (style.width - AXIS_WIDTH - PADDING).max(1.0);
    let usable = style.height - 2.0 * PADDING - DATE_AXIS_HEIGHT;
    let volume_height = usable * style.volume_share.clamp(0.0, 0.9);
    let price_top = PADDING;
    let price_bottom = PADDING + usable - volume_height - PADDING;
    let volume_bottom = PADDING + usable;

    // older bars scroll out once the slots would get narrower than `min_bar_spacing`
    let capacity = ((plot_width / style.min_bar_spacing.max(1.0)) as usize)
        .saturating_sub(style.right_offset)
        .max(1);
    let visible = &series[series.len().saturating_sub(capacity)..];
    let slot = plot_width / (visible.len() + style.right_offset) as f64;

    let mut price_min = visible.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let mut price_max = visible.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    if price_max - price_min < f64::EPSILON {
        let pad = (price_max.abs() * 0.01).max(1.0);
        price_min -= pad;
        price_max += pad;
    }
    let y = |price: f64| {
        price_top + (price_max - price) / (price_max - price_min) * (price_bottom - price_top)
    };

    let candles = visible
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let top = y(bar.open.max(bar.close));
            let bottom = y(bar.open.min(bar.close));
            Candle {
                date: bar.timestamp,
                x: PADDING + slot * (i as f64 + 0.5),
                wick_top: y(bar.high),
                wick_bottom: y(bar.low),
                body_top: top,
                body_height: (bottom - top).max(1.0),
                up: bar.is_up(),
            }
        })
        .collect();

    let max_volume = visible.iter().map(|b| b.volume).max().unwrap_or(0).max(1) as f64;
    let volume = visible
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let height = bar.volume.max(0) as f64 / max_volume * volume_height;
            VolumeBar {
                x: PADDING + slot * (i as f64 + 0.5),
                top: volume_bottom - height,
                height,
                up: bar.is_up(),
            }
        })
        .collect();

    let pivots = monthly_pivots(series);
    let lines = pivots
        .iter()
        .flat_map(|p| p.levels())
        .filter(|(_, price)| (price_min..=price_max).contains(price))
        .map(|(label, price)| PriceLine {
            label,
            price,
            y: y(price),
            dashed: label != "P",
            color: match label.as_bytes()[0] {
                b'R' => style.down.clone(),
                b'S' => style.up.clone(),
                _ => style.pivot.clone(),
            },
        })
        .collect();

    Chart::Candles(CandleChart {
        header,
        style: style.clone(),
        slot,
        candles,
        volume,
        lines,
        pivots,
        price_min,
        price_max,
    })
}

impl Chart {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Candles(chart) => &chart.header.symbol,
            Self::Empty(empty) => &empty.symbol,
        }
    }

    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::Candles(chart) => Some(&chart.header),
            Self::Empty(_) => None,
        }
    }

    /// Serialise the pane as a standalone `<svg>` element.
    pub fn to_svg(&self) -> String {
        match self {
            Self::Candles(chart) => chart.to_svg(),
            Self::Empty(empty) => empty.to_svg(),
        }
    }
}

impl CandleChart {
    fn to_svg(&self) -> String {
        let s = &self.style;
        let mut svg = open_svg(s, &self.header.symbol);
        let right = s.width - AXIS_WIDTH;
        let half_body = (self.slot * 0.35).max(0.5);

        // writing to a String cannot fail
        for line in &self.lines {
            let dash = if line.dashed { r#" stroke-dasharray="4 3""# } else { "" };
            let _ = write!(
                svg,
                r#"<line x1="{PADDING}" y1="{y:.2}" x2="{right:.2}" y2="{y:.2}" stroke="{c}" stroke-width="1"{dash}/><text x="{tx:.2}" y="{ty:.2}" fill="{c}" font-size="{fs}">{label} {price:.2}</text>"#,
                y = line.y,
                c = line.color,
                tx = right + 4.0,
                ty = line.y + 4.0,
                fs = s.font_size - 2.0,
                label = line.label,
                price = line.price,
            );
        }

        for (candle, volume) in self.candles.iter().zip(&self.volume) {
            let color = if candle.up { &s.up } else { &s.down };
            let _ = write!(
                svg,
                r#"<g><title>{date}</title><line x1="{x:.2}" y1="{wt:.2}" x2="{x:.2}" y2="{wb:.2}" stroke="{color}"/><rect x="{bx:.2}" y="{bt:.2}" width="{bw:.2}" height="{bh:.2}" fill="{color}"/><rect x="{bx:.2}" y="{vt:.2}" width="{bw:.2}" height="{vh:.2}" fill="{color}" fill-opacity="0.5"/></g>"#,
                date = candle.date,
                x = candle.x,
                wt = candle.wick_top,
                wb = candle.wick_bottom,
                bx = candle.x - half_body,
                bt = candle.body_top,
                bw = half_body * 2.0,
                bh = candle.body_height,
                vt = volume.top,
                vh = volume.height,
            );
        }

        // price axis: top and bottom of the visible range
        for (price, y) in [(self.price_max, PADDING + 4.0), (self.price_min, self.price_axis_bottom())] {
            let _ = write!(
                svg,
                r#"<text x="{x:.2}" y="{y:.2}" fill="{fill}" font-size="{fs}">{price:.2}</text>"#,
                x = right + 4.0,
                fill = s.text,
                fs = s.font_size - 2.0,
            );
        }

        // date axis: first, middle, and last visible bar
        let n = self.candles.len();
        let mut ticks = vec![0, n / 2, n - 1];
        ticks.dedup();
        for i in ticks {
            let candle = &self.candles[i];
            let _ = write!(
                svg,
                r#"<text x="{x:.2}" y="{y:.2}" fill="{fill}" font-size="{fs}" text-anchor="middle">{date}</text>"#,
                x = candle.x.max(PADDING + 30.0).min(right - 30.0),
                y = s.height - PADDING,
                fill = s.text,
                fs = s.font_size - 2.0,
                date = candle.date.format("%d %b %y"),
            );
        }

        svg.push_str("</svg>");
        svg
    }

    fn price_axis_bottom(&self) -> f64 {
        let usable = self.style.height - 2.0 * PADDING - DATE_AXIS_HEIGHT;
        PADDING + usable * (1.0 - self.style.volume_share.clamp(0.0, 0.9)) - PADDING
    }
}

impl EmptyState {
    fn to_svg(&self) -> String {
        let s = &self.style;
        let mut svg = open_svg(s, &self.symbol);
        let _ = write!(
            svg,
            r#"<text x="{x:.2}" y="{y:.2}" fill="{fill}" font-size="{fs}" text-anchor="middle">{name}: {msg}</text></svg>"#,
            x = s.width / 2.0,
            y = s.height / 2.0,
            fill = s.text,
            fs = s.font_size + 2.0,
            name = escape(&self.name),
            msg = escape(&self.message),
        );
        svg
    }
}

fn open_svg(s: &ChartStyle, symbol: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="chart" data-symbol="{symbol}" viewBox="0 0 {w} {h}" width="{w}" height="{h}" font-family="{font}"><rect width="100%" height="100%" fill="{bg}"/>"#,
        symbol = escape(symbol),
        w = s.width,
        h = s.height,
        font = escape(&s.font_family),
        bg = s.background,
    )
}

/// Escape text for SVG/XML content and attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `6029120` -> `6,029,120`
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `1234.5` in rupees -> `₹1,234.50`
pub fn format_price(value: f64, currency: &str) -> String {
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!(
        "{sign}{currency}{}.{:02}",
        group_thousands((cents / 100) as i64),
        cents % 100
    )
}
