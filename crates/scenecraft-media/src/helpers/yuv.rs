// crates/scenecraft-media/src/helpers/yuv.rs
//
// YUV420P frame utilities shared across decode, effects and encode.
//
// Layout convention for packed YUV420P byte vecs:
//   [0 .. w*h]              — Y plane, packed (no stride)
//   [w*h .. w*h + uv_w*uv_h]        — U plane, packed
//   [w*h + uv_w*uv_h .. end]         — V plane, packed
//
// "Packed" means strides are removed — each row is exactly w (or uv_w) bytes.
// ffmpeg VideoFrame rows may have padding; extract_yuv strips it.

use ffmpeg_the_third::util::frame::video::Video as VideoFrame;

/// Extract packed (stride-free) YUV420P bytes from a scaled VideoFrame.
///
/// The frame must already be in `Pixel::YUV420P` format — call swscale first.
/// Returns a single Vec laid out as Y ++ U ++ V (see module doc for offsets).
pub fn extract_yuv(yuv: &VideoFrame, w: usize, h: usize, uv_w: usize, uv_h: usize) -> Vec<u8> {
    let mut raw = vec![0u8; w * h + uv_w * uv_h * 2];

    // Y plane
    let y_stride = yuv.stride(0);
    let y_src    = yuv.data(0);
    for row in 0..h {
        raw[row * w .. row * w + w]
            .copy_from_slice(&y_src[row * y_stride .. row * y_stride + w]);
    }

    // U plane
    let u_offset = w * h;
    let u_stride = yuv.stride(1);
    let u_src    = yuv.data(1);
    for row in 0..uv_h {
        let dst = u_offset + row * uv_w;
        raw[dst .. dst + uv_w]
            .copy_from_slice(&u_src[row * u_stride .. row * u_stride + uv_w]);
    }

    // V plane
    let v_offset = u_offset + uv_w * uv_h;
    let v_stride = yuv.stride(2);
    let v_src    = yuv.data(2);
    for row in 0..uv_h {
        let dst = v_offset + row * uv_w;
        raw[dst .. dst + uv_w]
            .copy_from_slice(&v_src[row * v_stride .. row * v_stride + uv_w]);
    }

    raw
}

/// Bilinear-resample a crop window of a single packed, stride-free plane into
/// a `dst_w x dst_h` output plane.
///
/// `(crop_x, crop_y, crop_w, crop_h)` are in source-plane pixel units (may be
/// fractional — Ken-Burns crop origins come out of a scale/offset lerp).
/// Samples outside `[0, src_w) x [0, src_h)` are clamped to the nearest edge
/// pixel, matching `zoompan`'s edge behavior instead of introducing a black
/// border when a crop window nudges past the source bounds from rounding.
pub fn resample_plane(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    crop_x: f64,
    crop_y: f64,
    crop_w: f64,
    crop_h: f64,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; dst_w * dst_h];
    if dst_w == 0 || dst_h == 0 {
        return out;
    }
    let sample = |fx: f64, fy: f64| -> f64 {
        let fx = fx.clamp(0.0, (src_w - 1) as f64);
        let fy = fy.clamp(0.0, (src_h - 1) as f64);
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(src_w - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let p00 = src[y0 * src_w + x0] as f64;
        let p10 = src[y0 * src_w + x1] as f64;
        let p01 = src[y1 * src_w + x0] as f64;
        let p11 = src[y1 * src_w + x1] as f64;

        let top = p00 + (p10 - p00) * tx;
        let bot = p01 + (p11 - p01) * tx;
        top + (bot - top) * ty
    };

    for dy in 0..dst_h {
        let fy = crop_y + (dy as f64 + 0.5) / dst_h as f64 * crop_h;
        for dx in 0..dst_w {
            let fx = crop_x + (dx as f64 + 0.5) / dst_w as f64 * crop_w;
            out[dy * dst_w + dx] = sample(fx, fy).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Write a packed YUV420P buffer back into a VideoFrame's planes, respecting stride.
///
/// The inverse of `extract_yuv` — used once a scene/transition frame has been
/// produced in plain-buffer form and needs to go to the encoder, which expects
/// a strided VideoFrame.
pub fn write_yuv(packed: &[u8], yuv: &mut VideoFrame, w: usize, h: usize, uv_w: usize, uv_h: usize) {
    // Y plane
    let y_stride = yuv.stride(0);
    let y_dst    = yuv.data_mut(0);
    for row in 0..h {
        y_dst[row * y_stride .. row * y_stride + w]
            .copy_from_slice(&packed[row * w .. row * w + w]);
    }

    // U plane
    let u_offset = w * h;
    let u_stride = yuv.stride(1);
    let u_dst    = yuv.data_mut(1);
    for row in 0..uv_h {
        let src = u_offset + row * uv_w;
        u_dst[row * u_stride .. row * u_stride + uv_w]
            .copy_from_slice(&packed[src .. src + uv_w]);
    }

    // V plane
    let v_offset = u_offset + uv_w * uv_h;
    let v_stride = yuv.stride(2);
    let v_dst    = yuv.data_mut(2);
    for row in 0..uv_h {
        let src = v_offset + row * uv_w;
        v_dst[row * v_stride .. row * v_stride + uv_w]
            .copy_from_slice(&packed[src .. src + uv_w]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_full_frame_is_near_identity() {
        let (w, h) = (4usize, 4usize);
        let src: Vec<u8> = (0..16u8).collect();
        let out = resample_plane(&src, w, h, 0.0, 0.0, w as f64, h as f64, w, h);
        assert_eq!(out.len(), 16);
        // Center samples should land close to the source values (bilinear,
        // half-pixel sampling grid means this isn't byte-exact).
        for (a, b) in src.iter().zip(out.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 2);
        }
    }

    #[test]
    fn resample_crop_clamps_to_edges() {
        let (w, h) = (4usize, 4usize);
        let src = vec![100u8; w * h];
        let out = resample_plane(&src, w, h, -2.0, -2.0, w as f64, h as f64, w, h);
        assert!(out.iter().all(|&v| v == 100));
    }
}