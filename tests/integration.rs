use std::env;
use std::process;

use delogo::{
    extract_intervals, interval, score_frames, select_logo, CancelToken, FrameBuf, IntervalConfig,
    LogoHeader, LogoModel, LogoScan, MaskedModel, ScanConfig, Trim,
};

const FRAME_W: u32 = 64;
const FRAME_H: u32 = 48;
const REGION_W: u32 = 24;
const REGION_H: u32 = 16;
const REGION_X: u32 = 8;
const REGION_Y: u32 = 8;

/// Stripe-pattern blend coefficients at a region-local position, identity
/// outside the logo silhouette.
fn logo_coeffs(x: usize, y: usize) -> (f32, f32) {
    let inside = (4..12).contains(&y) && (6..18).contains(&x);
    if !inside {
        (1.0, 0.0)
    } else if (x + y) % 3 == 0 {
        (0.6, 0.3)
    } else {
        (0.85, 0.1)
    }
}

/// Synthesize a 4:2:0 frame with uniform plane backgrounds and, at
/// `fade = 1`, the stripe logo composited over the scan region.
fn synth_frame(bg: [f32; 3], fade: f32) -> FrameBuf<u8> {
    let mut buf = FrameBuf::<u8>::new(FRAME_W, FRAME_H, 1, 1, 255.0);
    let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    buf.y_mut().iter_mut().for_each(|p| *p = to_u8(bg[0]));
    buf.u_mut().iter_mut().for_each(|p| *p = to_u8(bg[1]));
    buf.v_mut().iter_mut().for_each(|p| *p = to_u8(bg[2]));
    for y in 0..REGION_H as usize {
        for x in 0..REGION_W as usize {
            let (a, b) = logo_coeffs(x, y);
            let logo = a.mul_add(bg[0], b * 255.0);
            let v = fade.mul_add(logo - bg[0], bg[0]);
            let i = (REGION_Y as usize + y) * FRAME_W as usize + REGION_X as usize + x;
            buf.y_mut()[i] = to_u8(v);
        }
    }
    buf
}

/// Run the build phase over frames with varied backgrounds.
fn scan_model() -> LogoModel {
    let config = ScanConfig {
        x: REGION_X,
        y: REGION_Y,
        w: REGION_W,
        h: REGION_H,
        log_uvx: 1,
        log_uvy: 1,
        uniformity_threshold: 20.0,
    };
    let mut scan = LogoScan::new(config).unwrap();
    for i in 0..40 {
        let i = i as f32;
        let frame = synth_frame([40.0 + i * 4.0, 60.0 + i * 2.0, 200.0 - i * 3.0], 1.0);
        assert!(scan.add_frame(&frame.view()).unwrap());
    }
    scan.normalize(255.0);
    scan.into_logo(false).unwrap()
}

/// The stripe model written directly, bypassing the scan.
fn handcrafted_model() -> LogoModel {
    let header = LogoHeader {
        w: REGION_W,
        h: REGION_H,
        log_uvx: 1,
        log_uvy: 1,
        imgw: FRAME_W,
        imgh: FRAME_H,
        imgx: REGION_X,
        imgy: REGION_Y,
        service_id: -1,
        name: "integration".to_string(),
    };
    let mut model = LogoModel::identity(header).unwrap();
    let w = REGION_W as usize;
    let wh = w * REGION_H as usize;
    let mut data = model.raw().to_vec();
    for y in 0..REGION_H as usize {
        for x in 0..REGION_W as usize {
            let (a, b) = logo_coeffs(x, y);
            data[y * w + x] = a;
            data[wh + y * w + x] = b;
        }
    }
    model = LogoModel::from_parts(model.header().clone(), data).unwrap();
    model
}

#[test]
fn scan_save_load_score_pipeline() {
    let model = scan_model();

    // scanned coefficients match the composited truth
    let w = REGION_W as usize;
    let i = 5 * w + 7; // inside the logo, stripe with (0.6, 0.3)
    assert!((model.a_y()[i] - 0.6).abs() < 0.05, "A = {}", model.a_y()[i]);
    assert!((model.b_y()[i] - 0.3).abs() < 0.05, "B = {}", model.b_y()[i]);

    let path = env::temp_dir().join(format!("delogo-it-{}.lgd", process::id()));
    model.save(&path).unwrap();
    let loaded = LogoModel::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.header(), model.header());

    let masked = MaskedModel::prepare(loaded, 0.2, None).unwrap().unwrap();
    let with_logo = synth_frame([120.0, 128.0, 128.0], 1.0);
    let r = masked.evaluate_both(&with_logo.view()).unwrap();
    assert!(r.corr0 > 0.6, "corr0 = {}", r.corr0);
    assert!(r.corr1.abs() < 0.3, "corr1 = {}", r.corr1);

    let without = synth_frame([120.0, 128.0, 128.0], 0.0);
    let r = masked.evaluate_both(&without.view()).unwrap();
    assert!(r.corr0 < 0.3, "clean frame scored corr0 = {}", r.corr0);
}

#[test]
fn removal_restores_background() {
    let masked = MaskedModel::prepare(handcrafted_model(), 0.2, None)
        .unwrap()
        .unwrap();
    let mut frame = synth_frame([110.0, 128.0, 128.0], 1.0);
    masked.remove_logo(&mut frame, 1.0).unwrap();
    for y in 0..REGION_H as usize {
        for x in 0..REGION_W as usize {
            let i = (REGION_Y as usize + y) * FRAME_W as usize + REGION_X as usize + x;
            let diff = (i32::from(frame.view().y[i]) - 110).abs();
            assert!(diff <= 2, "pixel ({x},{y}) off by {diff}");
        }
    }
}

#[test]
fn scoring_and_interval_extraction_find_logo_run() {
    let masked = MaskedModel::prepare(handcrafted_model(), 0.2, None)
        .unwrap()
        .unwrap();
    let models = vec![masked];

    // logo burned in from frame 30 through 89 of 120
    let provider = |frame_no: u32| -> delogo::Result<FrameBuf<u8>> {
        let fade = if (30..90).contains(&frame_no) { 1.0 } else { 0.0 };
        let bg = 100.0 + (frame_no % 3) as f32 * 40.0;
        Ok(synth_frame([bg, 128.0, 128.0], fade))
    };
    let trims = [Trim { start: 0, end: 119 }];
    let evals = score_frames(&provider, &models, &trims, 4, None)
        .unwrap()
        .expect("not cancelled");
    assert_eq!(evals.len(), 120);

    assert_eq!(select_logo(&evals, 1), Some(0));

    let raw = interval::raw_scores(&evals, 1, 0);
    let config = IntervalConfig {
        avg_window: 10,
        minmax_window: 5,
        median_frames: 5,
    };
    let intervals = extract_intervals(&raw, &config);
    assert_eq!(intervals.len(), 1, "got {intervals:?}");
    let iv = intervals[0];
    assert!((i64::from(iv.start) - 30).abs() <= 2, "start = {}", iv.start);
    assert!((i64::from(iv.end) - 89).abs() <= 2, "end = {}", iv.end);
    assert!(iv.best >= iv.start && iv.best <= iv.end);

    let mut report = Vec::new();
    interval::write_report(&mut report, &intervals).unwrap();
    let text = String::from_utf8(report).unwrap();
    assert_eq!(interval::parse_report(&text).unwrap(), intervals);
}

#[test]
fn cancelled_scoring_returns_none() {
    let masked = MaskedModel::prepare(handcrafted_model(), 0.2, None)
        .unwrap()
        .unwrap();
    let models = vec![masked];
    let provider =
        |_: u32| -> delogo::Result<FrameBuf<u8>> { Ok(synth_frame([100.0, 128.0, 128.0], 0.0)) };
    let trims = [Trim { start: 0, end: 49 }];

    let token = CancelToken::new();
    token.cancel();
    let out = score_frames(&provider, &models, &trims, 2, Some(&token)).unwrap();
    assert!(out.is_none());
}
