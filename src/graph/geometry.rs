/// A positioned rectangle in display pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl VideoRect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle at the origin
    pub fn sized(w: i32, h: i32) -> Self {
        Self::new(0, 0, w, h)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// Center `src` inside `dst`.
///
/// With `scaling`, `src` is scaled to the largest size that fits `dst` while
/// keeping its aspect ratio. Without it, `src` is clipped to `dst`.
pub fn center_rect(src: VideoRect, dst: VideoRect, scaling: bool) -> VideoRect {
    if !scaling || src.is_empty() {
        let w = src.w.min(dst.w);
        let h = src.h.min(dst.h);
        return VideoRect::new(dst.x + (dst.w - w) / 2, dst.y + (dst.h - h) / 2, w, h);
    }

    if dst.is_empty() {
        return VideoRect::new(dst.x, dst.y, 0, 0);
    }

    let src_ratio = f64::from(src.w) / f64::from(src.h);
    let dst_ratio = f64::from(dst.w) / f64::from(dst.h);

    if src_ratio > dst_ratio {
        let h = (f64::from(dst.w) / src_ratio) as i32;
        VideoRect::new(dst.x, dst.y + (dst.h - h) / 2, dst.w, h)
    } else if src_ratio < dst_ratio {
        let w = (f64::from(dst.h) * src_ratio) as i32;
        VideoRect::new(dst.x + (dst.w - w) / 2, dst.y, w, dst.h)
    } else {
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_ratio_fills_destination() {
        let rect = center_rect(VideoRect::sized(640, 400), VideoRect::sized(1280, 800), true);
        assert_eq!(rect, VideoRect::sized(1280, 800));
    }

    #[test]
    fn test_wider_source_is_letterboxed() {
        let rect = center_rect(VideoRect::sized(1600, 800), VideoRect::sized(1280, 800), true);
        assert_eq!(rect, VideoRect::new(0, 80, 1280, 640));
    }

    #[test]
    fn test_taller_source_is_pillarboxed() {
        let rect = center_rect(VideoRect::sized(640, 640), VideoRect::sized(1280, 800), true);
        assert_eq!(rect, VideoRect::new(240, 0, 800, 800));
    }

    #[test]
    fn test_without_scaling_clips_and_centers() {
        let rect = center_rect(VideoRect::sized(640, 424), VideoRect::sized(1280, 800), false);
        assert_eq!(rect, VideoRect::new(320, 188, 640, 424));

        let rect = center_rect(VideoRect::sized(2000, 424), VideoRect::sized(1280, 800), false);
        assert_eq!(rect, VideoRect::new(0, 188, 1280, 424));
    }

    #[test]
    fn test_empty_rectangles() {
        let rect = center_rect(VideoRect::sized(640, 424), VideoRect::sized(0, 0), true);
        assert!(rect.is_empty());

        let rect = center_rect(VideoRect::sized(0, 0), VideoRect::sized(1280, 800), true);
        assert!(rect.is_empty());
    }
}
