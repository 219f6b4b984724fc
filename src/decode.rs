// decode.rs
//
// Copyright (c) 2026  Douglas Lau
//
use crate::bitmap::BitmapClient;
use crate::block::{
    self, DisposalMethod, GraphicControl, Header, ImageDesc,
    LogicalScreenDesc,
};
use crate::compose::{self, PrevFrame, TRANSPARENT};
use crate::error::{Error, Result};
use crate::frame::{FrameIndex, FrameInfo};
use crate::lzw::{self, Lzw};
use crate::rect::Rect;
use crate::{Rgba, MAX_COLOURS};
use log::{debug, warn};

/// Sentinel colour marking an unpopulated global colour table
const COLOURS_UNSET: Rgba = [0x00, 0x00, 0x00, 0xAA];

/// Sanity cap on the number of frames in a stream
const FRAME_MAX: u32 = 4096;

/// Largest believable logical screen dimension
const DIMENSION_MAX: u32 = 2048;

/// Screen sizes that broken encoders report in place of the image size
const QUIRK_SIZES: &[(u32, u32)] = &[
    (640, 480),
    (640, 512),
    (800, 600),
    (1024, 768),
    (1280, 1024),
    (1600, 1200),
];

/// Active colour table selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColourSource {
    Global,
    Local,
}

/// Animation metadata from
/// [Animation::info](struct.Animation.html#method.info)
#[derive(Debug, Clone, Copy)]
pub struct Info {
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// Number of fully surveyed frames
    pub frame_count: u32,
    /// Number of times to play the animation (0 means forever)
    pub loop_max: u32,
    /// Number of complete loops played so far
    pub loop_count: u32,
    /// Smallest non-zero frame delay, in centiseconds (0 if none)
    pub delay_min: u32,
}

/// Next animation step, from
/// [Animation::frame_prepare](struct.Animation.html#method.frame_prepare)
#[derive(Debug, Clone, Copy)]
pub struct FramePrepare {
    /// Rectangle that must be redrawn
    pub area: Rect,
    /// Delay before the following frame, in centiseconds
    pub delay_cs: u32,
    /// Frame to pass to
    /// [frame_decode](struct.Animation.html#method.frame_decode)
    pub frame: u32,
}

/// Progressive decoder for one animated GIF stream.
///
/// The source bytes are borrowed, never owned: the embedder passes the
/// current window to [data_scan] and [frame_decode], and may reallocate it
/// between calls as long as previously seen bytes are unchanged and the
/// window only grows.
///
/// ## Example
/// ```
/// use gifplay::{Animation, MemoryBitmaps};
///
/// # fn main() -> Result<(), gifplay::Error> {
/// # let gif = &[
/// #   0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00,
/// #   0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
/// #   0xFF, 0xFF, 0xFF, 0x2C, 0x00, 0x00, 0x00, 0x00,
/// #   0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44,
/// #   0x01, 0x00, 0x3B,
/// # ][..];
/// // ... read a GIF file into `gif`
/// let mut anim = Animation::new(MemoryBitmaps);
/// anim.data_scan(gif)?;
/// let step = anim.frame_prepare()?;
/// let bitmap = anim.frame_decode(gif, step.frame)?;
/// // ... display bitmap, wait step.delay_cs
/// # Ok(())
/// # }
/// ```
///
/// [data_scan]: struct.Animation.html#method.data_scan
/// [frame_decode]: struct.Animation.html#method.frame_decode
pub struct Animation<C: BitmapClient> {
    /// Bitmap capability supplied by the embedder
    client: C,
    /// LZW decode context
    lzw: Lzw,
    /// Discovered frames
    frames: FrameIndex,
    /// Canvas width (may grow during scanning)
    width: u32,
    /// Canvas height (may grow during scanning)
    height: u32,
    /// Number of fully surveyed frames
    frame_count: u32,
    /// Number of partially surveyed frames
    frame_count_partial: u32,
    /// Frame currently materialised in the bitmap
    decoded_frame: Option<u32>,
    /// Frame most recently returned by `frame_prepare`
    frame: Option<u32>,
    /// Client bitmap, created lazily at first decode
    bitmap: Option<C::Bitmap>,
    /// Canvas width latched when the bitmap was created
    canvas_width: u32,
    /// Canvas height latched when the bitmap was created
    canvas_height: u32,
    /// Number of times to play the animation (0 means forever)
    loop_max: u32,
    /// Complete loops played so far
    loop_count: u32,
    /// Survey cursor into the source window
    buffer_pos: usize,
    /// Source window size at the last scan
    buffer_size: usize,
    /// Background colour index
    bg_index: u32,
    /// Background colour
    bg_colour: Rgba,
    /// Whether the stream declares a global colour table
    global_colours: bool,
    /// Global colour table size in entries
    colour_table_size: usize,
    /// Global colour table
    global_colour_table: [Rgba; MAX_COLOURS],
    /// Scratch local colour table
    local_colour_table: [Rgba; MAX_COLOURS],
    /// Colour table selected for the frame being decoded
    colour_source: ColourSource,
    /// Canvas snapshot for restore-previous disposal
    prev_frame: Option<PrevFrame>,
}

impl<C: BitmapClient> Animation<C> {
    /// Create a new animation decoder.
    ///
    /// No pixel memory is allocated until the first frame is decoded.
    pub fn new(client: C) -> Self {
        Animation {
            client,
            lzw: Lzw::new(),
            frames: FrameIndex::default(),
            width: 0,
            height: 0,
            frame_count: 0,
            frame_count_partial: 0,
            decoded_frame: None,
            frame: None,
            bitmap: None,
            canvas_width: 0,
            canvas_height: 0,
            loop_max: 1,
            loop_count: 0,
            buffer_pos: 0,
            buffer_size: 0,
            bg_index: 0,
            bg_colour: TRANSPARENT,
            global_colours: false,
            colour_table_size: 0,
            global_colour_table: [TRANSPARENT; MAX_COLOURS],
            local_colour_table: [TRANSPARENT; MAX_COLOURS],
            colour_source: ColourSource::Global,
            prev_frame: None,
        }
    }

    /// Scan the source data for frames.
    ///
    /// `data` must contain the same bytes as every earlier call, possibly
    /// followed by new ones.  Frames surveyed by earlier calls are kept on
    /// any error, and [Error::InsufficientData] is recoverable: supply more
    /// data and scan again.
    pub fn data_scan(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < self.buffer_size {
            return Err(Error::DataError);
        }
        self.buffer_size = data.len();

        if self.buffer_pos == 0 {
            self.parse_preamble(data)?;
        }

        // a lone trailer after the preamble is a complete, frameless GIF
        if self.buffer_pos + 1 == data.len()
            && data[self.buffer_pos] == block::TRAILER
        {
            return Ok(());
        }

        // process the colour map if we haven't already; the alpha byte of
        // entry 0 tells us whether it has been filled in
        if self.global_colour_table[0] == COLOURS_UNSET {
            self.process_colours(data)?;
        }

        // repeatedly try to survey frames
        loop {
            match self.process_frame(data, self.frame_count, false) {
                Err(Error::Working) => (),
                res => return res,
            }
        }
    }

    /// Get the next frame to show, with its redraw area and delay.
    ///
    /// Advances the animation, wrapping at the end of the frame list and
    /// counting loops; returns [Error::AnimationComplete] once the loop
    /// count has been exhausted.
    pub fn frame_prepare(&mut self) -> Result<FramePrepare> {
        if self.frame_count == 0 {
            return Err(Error::FrameNoDisplay);
        }
        if self.loop_max != 0 && self.loop_count >= self.loop_max {
            return Err(Error::AnimationComplete);
        }

        // rectangle of the frame currently shown
        let prev_rect = self
            .frame
            .and_then(|f| self.frames.get(f))
            .filter(|f| f.display)
            .map(|f| f.rect)
            .unwrap_or_default();

        let (next, wrapped) = match self.frame {
            Some(f) if f + 1 < self.frame_count => (f + 1, false),
            Some(_) => (0, true),
            None => (0, false),
        };
        if wrapped {
            self.loop_count += 1;
            if self.loop_max != 0 && self.loop_count >= self.loop_max {
                return Err(Error::AnimationComplete);
            }
        }
        self.frame = Some(next);

        let frame = self.frames.get(next).ok_or(Error::FrameInvalid)?;
        let area = if frame.redraw_required {
            frame.rect.union(prev_rect)
        } else {
            frame.rect
        };
        Ok(FramePrepare {
            area,
            delay_cs: frame.delay_cs,
            frame: next,
        })
    }

    /// Decode a frame, composing it onto the canvas bitmap.
    ///
    /// Any fully surveyed frame index is accepted, not only the one from
    /// [frame_prepare](struct.Animation.html#method.frame_prepare).
    /// Decoding the materialised frame again is a no-op.
    pub fn frame_decode(
        &mut self,
        data: &[u8],
        frame: u32,
    ) -> Result<&C::Bitmap> {
        debug!("decoding frame {}", frame);
        self.process_frame(data, frame, true)?;
        self.bitmap.as_ref().ok_or(Error::InsufficientMemory)
    }

    /// Rewind the animation to play from the first frame
    pub fn reset(&mut self) {
        self.loop_count = 0;
        self.frame = None;
        self.decoded_frame = None;
    }

    /// Get information about the animation
    pub fn info(&self) -> Info {
        let delay_min = self
            .frames
            .iter()
            .take(self.frame_count as usize)
            .map(|f| f.delay_cs)
            .filter(|d| *d > 0)
            .min()
            .unwrap_or(0);
        Info {
            width: self.width,
            height: self.height,
            frame_count: self.frame_count,
            loop_max: self.loop_max,
            loop_count: self.loop_count,
            delay_min,
        }
    }

    /// Get information about one frame
    pub fn frame_info(&self, frame: u32) -> Option<FrameInfo> {
        self.frames.get(frame).map(FrameInfo::from)
    }

    /// Get the canvas bitmap, if a frame has been decoded
    pub fn bitmap(&self) -> Option<&C::Bitmap> {
        self.bitmap.as_ref()
    }

    /// Parse the header and logical screen descriptor
    fn parse_preamble(&mut self, data: &[u8]) -> Result<()> {
        let header = Header::from_buf(data)?;
        let lsd = LogicalScreenDesc::from_buf(data.get(6..).unwrap_or(&[]))?;
        debug!(
            "GIF{} {}x{}",
            String::from_utf8_lossy(&header.version()),
            lsd.screen_width(),
            lsd.screen_height()
        );
        self.width = lsd.screen_width();
        self.height = lsd.screen_height();
        self.global_colours = lsd.has_color_table();
        self.colour_table_size = lsd.color_table_len();
        self.bg_index = lsd.background_color_idx().into();
        self.loop_max = 1;
        self.buffer_pos = 13;
        // Some broken GIFs report the size of the screen they were created
        // on.  Reset those to 1x1 and let the frames grow the canvas.
        let quirk = QUIRK_SIZES.contains(&(self.width, self.height))
            || self.width == 0
            || self.height == 0
            || self.width > DIMENSION_MAX
            || self.height > DIMENSION_MAX;
        if quirk {
            warn!("screen size quirk: {}x{}", self.width, self.height);
            self.width = 1;
            self.height = 1;
        }
        self.global_colour_table[0] = COLOURS_UNSET;
        Ok(())
    }

    /// Populate the global colour table and background colour
    fn process_colours(&mut self, data: &[u8]) -> Result<()> {
        if self.global_colours {
            let pos = self.buffer_pos;
            extract_colour_table(
                &mut self.global_colour_table,
                self.colour_table_size,
                data,
                pos,
            )?;
            self.buffer_pos = pos + self.colour_table_size * 3;
        } else {
            // default colour table: black and white
            self.global_colour_table[0] = [0x00, 0x00, 0x00, 0xFF];
            self.global_colour_table[1] = [0xFF, 0xFF, 0xFF, 0xFF];
        }
        let bg = self.bg_index as usize;
        self.bg_colour = if self.global_colours && bg < self.colour_table_size
        {
            self.global_colour_table[bg]
        } else {
            self.global_colour_table[0]
        };
        Ok(())
    }

    /// Process one frame: survey it (`decode` false) or decode its pixels
    /// (`decode` true).
    fn process_frame(
        &mut self,
        data: &[u8],
        frame_idx: u32,
        decode: bool,
    ) -> Result<()> {
        let mut pos;
        if decode {
            let frame =
                self.frames.get(frame_idx).ok_or(Error::FrameInvalid)?;
            if !frame.display {
                return Err(Error::FrameNoDisplay);
            }
            if self.decoded_frame == Some(frame_idx) {
                return Ok(());
            }
            pos = frame.frame_pointer;
        } else {
            pos = self.buffer_pos;
            // check if we've finished
            if pos < data.len() && data[pos] == block::TRAILER {
                return Ok(());
            }
            // junk data could report millions of frames
            if frame_idx > FRAME_MAX {
                return Err(Error::FrameDataError);
            }
            self.frames.ensure(frame_idx, pos);
            debug!("surveying frame {} at {}", frame_idx, pos);
        }
        let survey = !decode;
        self.parse_frame_extensions(data, &mut pos, frame_idx, survey)?;
        self.parse_image_descriptor(data, &mut pos, frame_idx, survey)?;
        self.parse_colour_table(data, &mut pos, frame_idx, decode)?;
        self.parse_image_data(data, &mut pos, frame_idx, decode)
    }

    /// Parse the extensions preceding a frame's image descriptor.
    ///
    /// The survey pass extracts graphic control and application metadata;
    /// the decode pass only steps over the blocks.  Comment, plain text
    /// and unknown extensions are skipped in both.
    fn parse_frame_extensions(
        &mut self,
        data: &[u8],
        pos: &mut usize,
        frame_idx: u32,
        survey: bool,
    ) -> Result<()> {
        let mut p = *pos;
        while p < data.len() && data[p] == block::EXTENSION_INTRODUCER {
            p += 1;
            if p >= data.len() {
                return Err(Error::InsufficientData);
            }
            let mut block_step = true;
            match data[p] {
                block::EXT_GRAPHIC_CONTROL if survey => {
                    let gce = GraphicControl::from_buf(&data[p..])?;
                    let frame = self
                        .frames
                        .get_mut(frame_idx)
                        .ok_or(Error::FrameInvalid)?;
                    frame.delay_cs = gce.delay_time_cs().into();
                    if let Some(idx) = gce.transparent_color() {
                        frame.transparency = true;
                        frame.transparency_index = idx.into();
                    }
                    frame.disposal_method = gce.disposal_method();
                    // clearing the background means the next redraw must
                    // also cover this frame
                    frame.redraw_required = matches!(
                        frame.disposal_method,
                        DisposalMethod::RestoreBackground
                            | DisposalMethod::RestorePrevious
                    );
                }
                block::EXT_APPLICATION if survey => {
                    self.parse_extension_application(&data[p..])?;
                }
                block::EXT_COMMENT => {
                    // no preamble; step straight to the sub-blocks
                    p += 1;
                    block_step = false;
                }
                _ => (),
            }
            if block_step {
                // skip the label, size field and declared payload
                if p + 1 >= data.len() {
                    return Err(Error::InsufficientData);
                }
                p += 2 + usize::from(data[p + 1]);
            }
            // drain remaining sub-blocks up to the terminator
            loop {
                if p >= data.len() {
                    return Err(Error::InsufficientData);
                }
                if data[p] == block::BLOCK_TERMINATOR {
                    p += 1;
                    break;
                }
                p += usize::from(data[p]) + 1;
            }
        }
        *pos = p;
        Ok(())
    }

    /// Parse a NETSCAPE2.0 application extension.
    ///
    /// `buf` starts at the extension label:
    ///
    /// ```text
    ///  +0   CHAR    Application Extension Label (0xFF)
    ///  +1   CHAR    Block Size (0x0B)
    ///  +2   8CHARS  Application Identifier
    ///  +10  3CHARS  Authentication Code
    ///  +13  CHAR    Sub-block Size (0x03)
    ///  +14  CHAR    Sub-block ID (0x01)
    ///  +15  SHORT   Loop Count
    /// ```
    fn parse_extension_application(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() < 17 {
            return Err(Error::InsufficientData);
        }
        if buf[1] == 0x0B
            && &buf[2..13] == b"NETSCAPE2.0"
            && buf[13] == 0x03
            && buf[14] == 0x01
        {
            // zero means loop forever
            self.loop_max = u16::from_le_bytes([buf[15], buf[16]]).into();
            debug!("loop count {}", self.loop_max);
        }
        Ok(())
    }

    /// Parse a frame's image descriptor.
    ///
    /// The survey pass records the frame rectangle and flags, and lets the
    /// frame grow the canvas; the decode pass steps over the descriptor.
    fn parse_image_descriptor(
        &mut self,
        data: &[u8],
        pos: &mut usize,
        frame_idx: u32,
        survey: bool,
    ) -> Result<()> {
        let buf = data.get(*pos..).unwrap_or(&[]);
        if buf.len() < 10 {
            return Err(Error::InsufficientData);
        }
        if survey {
            let desc = ImageDesc::from_buf(buf)?;
            let rect = Rect::with_extent(
                desc.left(),
                desc.top(),
                desc.width(),
                desc.height(),
            );
            // frames may grow the canvas to cover their rectangle
            self.width = self.width.max(rect.x1);
            self.height = self.height.max(rect.y1);
            let frame = self
                .frames
                .get_mut(frame_idx)
                .ok_or(Error::FrameInvalid)?;
            frame.flags = desc.flags();
            frame.rect = rect;
        }
        *pos += 10;
        Ok(())
    }

    /// Select the colour table for a frame.
    ///
    /// The decode pass extracts a local colour table into the scratch
    /// buffer; the survey pass only steps over it.
    fn parse_colour_table(
        &mut self,
        data: &[u8],
        pos: &mut usize,
        frame_idx: u32,
        decode: bool,
    ) -> Result<()> {
        let frame = self.frames.get(frame_idx).ok_or(Error::FrameInvalid)?;
        let flags = frame.flags;
        if !ImageDesc::has_color_table(flags) {
            self.colour_source = ColourSource::Global;
            return Ok(());
        }
        let entries = ImageDesc::color_table_len(flags);
        if decode {
            extract_colour_table(
                &mut self.local_colour_table,
                entries,
                data,
                *pos,
            )?;
        } else if data.len() < *pos + entries * 3 {
            return Err(Error::InsufficientData);
        }
        *pos += entries * 3;
        self.colour_source = ColourSource::Local;
        Ok(())
    }

    /// Parse a frame's image data.
    ///
    /// The survey pass walks the sub-block chain to find the next record
    /// without touching LZW; the frame is counted only once the chain is
    /// terminated and at least one byte follows it.  The decode pass runs
    /// the compositor.
    fn parse_image_data(
        &mut self,
        data: &[u8],
        pos: &mut usize,
        frame_idx: u32,
        decode: bool,
    ) -> Result<()> {
        let p = *pos;
        let len = data.len().saturating_sub(p);

        if !decode {
            self.frame_count_partial =
                self.frame_count_partial.max(frame_idx + 1);
        }

        // A trailer, or a minimum code size followed by a trailer, is
        // treated as a clean end of the stream without image data.
        match len {
            0 => return Err(Error::InsufficientData),
            1 | 2 => {
                if data[p] == block::TRAILER {
                    return Ok(());
                }
                if len == 2 && data[p + 1] == block::TRAILER {
                    return Ok(());
                }
                return Err(Error::InsufficientData);
            }
            _ => {
                if data[p] == block::TRAILER {
                    return Ok(());
                }
            }
        }

        if data[p] >= lzw::CODE_MAX {
            return Err(Error::DataError);
        }

        if decode {
            return self.update_bitmap(data, frame_idx, p);
        }

        // walk the sub-block chain without decoding
        let mut q = p + 1;
        loop {
            if q >= data.len() {
                return Err(Error::InsufficientData);
            }
            if data[q] == block::BLOCK_TERMINATOR {
                q += 1;
                break;
            }
            q += usize::from(data[q]) + 1;
            if q > data.len() {
                return Err(Error::InsufficientData);
            }
        }

        // the frame counts only once a trailer or another record follows
        if q >= data.len() {
            return Err(Error::InsufficientData);
        }
        self.frame_count = self.frame_count.max(frame_idx + 1);
        if let Some(frame) = self.frames.get_mut(frame_idx) {
            frame.display = true;
        }
        self.buffer_pos = q;
        *pos = q;

        if data[q] == block::TRAILER {
            Ok(())
        } else {
            Err(Error::Working)
        }
    }

    /// Compose a frame onto the canvas bitmap.
    ///
    /// `data_pos` is the offset of the frame's minimum code size byte.
    fn update_bitmap(
        &mut self,
        data: &[u8],
        frame_idx: u32,
        data_pos: usize,
    ) -> Result<()> {
        // make sure we have a canvas to decode to; its extent latches here
        if self.bitmap.is_none() {
            let bitmap = self
                .client
                .create(self.width, self.height)
                .ok_or(Error::InsufficientMemory)?;
            self.bitmap = Some(bitmap);
            self.canvas_width = self.width;
            self.canvas_height = self.height;
        }
        let width = self.canvas_width;
        let height = self.canvas_height;
        let canvas_len = width as usize * height as usize * 4;
        let bitmap = match self.bitmap.as_mut() {
            Some(bitmap) => bitmap,
            None => return Err(Error::InsufficientMemory),
        };
        let buffer = self.client.buffer(&mut *bitmap);
        if buffer.len() < canvas_len {
            return Err(Error::InsufficientMemory);
        }
        let buffer = &mut buffer[..canvas_len];

        // canvas preparation before composing this frame
        if frame_idx == 0 || self.decoded_frame.is_none() {
            compose::fill(buffer, TRANSPARENT);
        } else if let Some(prev) = self.frames.get(frame_idx - 1) {
            match prev.disposal_method {
                DisposalMethod::RestoreBackground => {
                    compose::restore_bg(
                        buffer,
                        width,
                        height,
                        prev,
                        self.bg_colour,
                    );
                }
                DisposalMethod::RestorePrevious => {
                    if !compose::recover_frame(
                        &self.prev_frame,
                        buffer,
                        width,
                        height,
                    ) {
                        compose::restore_bg(
                            buffer,
                            width,
                            height,
                            prev,
                            self.bg_colour,
                        );
                    }
                }
                _ => (),
            }
        }

        let frame = self.frames.get(frame_idx).ok_or(Error::FrameInvalid)?;
        if frame.disposal_method == DisposalMethod::RestorePrevious {
            // store the canvas for later restoration
            compose::record_frame(
                &mut self.prev_frame,
                buffer,
                width,
                height,
                frame_idx,
            );
        }

        let table = match self.colour_source {
            ColourSource::Global => &self.global_colour_table,
            ColourSource::Local => &self.local_colour_table,
        };
        let rect = frame.rect;
        let interlace = ImageDesc::interlaced(frame.flags);
        let transparency_index = frame.transparency_index;
        let res = if !interlace && rect.width() == width && rect.x0 == 0 {
            compose::decode_simple(
                &mut self.lzw,
                data,
                data_pos,
                rect.height(),
                rect.y0,
                transparency_index,
                width,
                height,
                buffer,
                table,
            )
        } else {
            compose::decode_complex(
                &mut self.lzw,
                data,
                data_pos,
                rect,
                interlace,
                transparency_index,
                width,
                height,
                buffer,
                table,
            )
        };

        // the pixels may have changed even when decoding failed
        self.client.modified(bitmap);
        res?;

        let opaque = self.client.test_opaque(bitmap);
        let frame = self
            .frames
            .get_mut(frame_idx)
            .ok_or(Error::FrameInvalid)?;
        if !frame.decoded {
            frame.opaque = opaque;
            frame.decoded = true;
        }
        let opaque = frame.opaque;
        self.client.set_opaque(bitmap, opaque);
        self.decoded_frame = Some(frame_idx);
        Ok(())
    }
}

/// Extract a colour table from RGB triples in the source.
///
/// Entries are packed bytewise with red in byte 0 and the alpha forced
/// opaque in byte 3.
fn extract_colour_table(
    table: &mut [Rgba; MAX_COLOURS],
    entries: usize,
    data: &[u8],
    pos: usize,
) -> Result<()> {
    let end = pos + entries * 3;
    if data.len() < end {
        return Err(Error::InsufficientData);
    }
    for (entry, rgb) in
        table.iter_mut().zip(data[pos..end].chunks_exact(3))
    {
        *entry = [rgb[0], rgb[1], rgb[2], 0xFF];
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::MemoryBitmaps;

    // minimal 1x1 black GIF
    const MINIMAL: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80,
        0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01,
        0x00, 0x3B,
    ];

    // 2x2 animation: a black frame then a white frame, 10 cs delays
    const TWO_FRAME: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x02, 0x00, 0x80,
        0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04,
        0x04, 0x0A, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x02,
        0x00, 0x02, 0x00, 0x00, 0x02, 0x03, 0x04, 0x80, 0x02, 0x00, 0x21,
        0xF9, 0x04, 0x04, 0x0A, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00,
        0x00, 0x02, 0x00, 0x02, 0x00, 0x00, 0x02, 0x03, 0x4C, 0x92, 0x02,
        0x00, 0x3B,
    ];

    // 2x2 animation exercising restore-previous disposal: black frame,
    // then a 1x1 white frame at (0,0) disposed to previous, then a 1x1
    // white frame at (1,1)
    const RESTORE_PREV: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x02, 0x00, 0x80,
        0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04,
        0x04, 0x0A, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x02,
        0x00, 0x02, 0x00, 0x00, 0x02, 0x03, 0x04, 0x80, 0x02, 0x00, 0x21,
        0xF9, 0x04, 0x0C, 0x0A, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00,
        0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x4C, 0x01, 0x00,
        0x21, 0xF9, 0x04, 0x04, 0x0A, 0x00, 0x00, 0x00, 0x2C, 0x01, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x4C, 0x01,
        0x00, 0x3B,
    ];

    fn scan(data: &[u8]) -> Animation<MemoryBitmaps> {
        let mut anim = Animation::new(MemoryBitmaps);
        anim.data_scan(data).unwrap();
        anim
    }

    fn pixels(anim: &Animation<MemoryBitmaps>) -> Vec<u8> {
        anim.bitmap().unwrap().pixels().to_vec()
    }

    /// Pack pixels as literal LZW codes into image data sub-blocks
    fn literal_image_data(min_code: u8, pixels: &[u8]) -> Vec<u8> {
        fn put(
            code: u16,
            width: u8,
            acc: &mut u32,
            nbits: &mut u8,
            out: &mut Vec<u8>,
        ) {
            *acc |= u32::from(code) << *nbits;
            *nbits += width;
            while *nbits >= 8 {
                out.push(*acc as u8);
                *acc >>= 8;
                *nbits -= 8;
            }
        }
        let clear = 1u16 << min_code;
        let eoi = clear + 1;
        let mut width = min_code + 1;
        let mut table_len = usize::from(eoi) + 1;
        let mut acc = 0;
        let mut nbits = 0;
        let mut codes = Vec::new();
        put(clear, width, &mut acc, &mut nbits, &mut codes);
        for (i, px) in pixels.iter().enumerate() {
            put((*px).into(), width, &mut acc, &mut nbits, &mut codes);
            if i > 0 {
                // mirror the decoder's dictionary growth
                let idx = table_len;
                table_len += 1;
                if idx == 1 << width && width < 12 {
                    width += 1;
                }
            }
        }
        put(eoi, width, &mut acc, &mut nbits, &mut codes);
        if nbits > 0 {
            codes.push(acc as u8);
        }
        let mut out = vec![min_code];
        for chunk in codes.chunks(255) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
        out.push(0x00);
        out
    }

    #[test]
    fn minimal_static() {
        let mut anim = scan(MINIMAL);
        let info = anim.info();
        assert_eq!((info.width, info.height), (1, 1));
        assert_eq!(info.frame_count, 1);
        assert_eq!(info.loop_max, 1);
        let bitmap = anim.frame_decode(MINIMAL, 0).unwrap();
        assert_eq!(bitmap.pixels(), [0x00, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn prepare_order() {
        let mut anim = scan(TWO_FRAME);
        assert_eq!(anim.info().frame_count, 2);
        assert_eq!(anim.info().delay_min, 10);
        assert_eq!(anim.frame_info(0).unwrap().delay_cs, 10);
        let step = anim.frame_prepare().unwrap();
        assert_eq!((step.frame, step.delay_cs), (0, 10));
        assert_eq!(step.area, Rect { x0: 0, y0: 0, x1: 2, y1: 2 });
        assert_eq!(anim.frame_prepare().unwrap().frame, 1);
        assert_eq!(
            anim.frame_prepare().unwrap_err(),
            Error::AnimationComplete
        );
        // a reset resumes from the first frame
        anim.reset();
        assert_eq!(anim.frame_prepare().unwrap().frame, 0);
    }

    #[test]
    fn infinite_loop() {
        // NETSCAPE2.0 extension with loop count 0 before the first frame
        let mut gif = TWO_FRAME[..19].to_vec();
        gif.extend_from_slice(&[0x21, 0xFF, 0x0B]);
        gif.extend_from_slice(b"NETSCAPE2.0");
        gif.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
        gif.extend_from_slice(&TWO_FRAME[19..]);
        let mut anim = scan(&gif);
        assert_eq!(anim.info().loop_max, 0);
        for _ in 0..3 {
            assert_eq!(anim.frame_prepare().unwrap().frame, 0);
            assert_eq!(anim.frame_prepare().unwrap().frame, 1);
        }
        assert_eq!(anim.info().loop_count, 2);
    }

    #[test]
    fn restore_previous() {
        let mut anim = scan(RESTORE_PREV);
        assert_eq!(anim.info().frame_count, 3);
        anim.frame_decode(RESTORE_PREV, 0).unwrap();
        // no snapshot needed yet
        assert!(anim.prev_frame.is_none());
        let after0 = pixels(&anim);
        anim.frame_decode(RESTORE_PREV, 1).unwrap();
        // snapshot allocated lazily when the restore-previous frame decodes
        assert!(anim.prev_frame.is_some());
        anim.frame_decode(RESTORE_PREV, 2).unwrap();
        let after2 = pixels(&anim);
        // within frame 1's rectangle the canvas matches the frame 0 state
        assert_eq!(after2[..4], after0[..4]);
        assert_eq!(&after2[12..16], &[0xFF, 0xFF, 0xFF, 0xFF][..]);
    }

    #[test]
    fn redraw_area_union() {
        let mut anim = scan(RESTORE_PREV);
        assert_eq!(
            anim.frame_prepare().unwrap().area,
            Rect { x0: 0, y0: 0, x1: 2, y1: 2 }
        );
        // a frame disposed to previous must redraw the prior frame too
        assert_eq!(
            anim.frame_prepare().unwrap().area,
            Rect { x0: 0, y0: 0, x1: 2, y1: 2 }
        );
        // a kept frame redraws only its own rectangle
        assert_eq!(
            anim.frame_prepare().unwrap().area,
            Rect { x0: 1, y0: 1, x1: 2, y1: 2 }
        );
    }

    #[test]
    fn truncated_scan_resumes() {
        let mut anim = Animation::new(MemoryBitmaps);
        // cut inside the first frame's LZW sub-block
        assert_eq!(
            anim.data_scan(&MINIMAL[..32]),
            Err(Error::InsufficientData)
        );
        assert_eq!(anim.info().frame_count, 0);
        assert_eq!(anim.frame_count_partial, 1);
        // supplying the remaining bytes recovers
        anim.data_scan(MINIMAL).unwrap();
        assert_eq!(anim.info().frame_count, 1);
        let bitmap = anim.frame_decode(MINIMAL, 0).unwrap();
        assert_eq!(bitmap.pixels(), [0x00, 0x00, 0x00, 0xFF]);
    }

    fn interlace_fixture(interlaced: bool, rows: &[u8]) -> Vec<u8> {
        // 8x8 frame over an 8-entry palette; row r holds palette index
        // rows[r] in source order
        let mut v = vec![
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 8, 0, 8, 0, 0x82, 0, 0,
        ];
        for i in 0..8u8 {
            v.extend_from_slice(&[i, 0, 0]);
        }
        let flags = if interlaced { 0x40 } else { 0x00 };
        v.extend_from_slice(&[0x2C, 0, 0, 0, 0, 8, 0, 8, 0, flags]);
        let mut px = Vec::new();
        for r in rows {
            px.extend_from_slice(&[*r; 8]);
        }
        v.extend_from_slice(&literal_image_data(3, &px));
        v.push(0x3B);
        v
    }

    #[test]
    fn interlaced_frame() {
        let gif = interlace_fixture(true, &[0, 1, 2, 3, 4, 5, 6, 7]);
        let mut anim = scan(&gif);
        let bitmap = anim.frame_decode(&gif, 0).unwrap();
        // pass order {0,8,..} {4,12,..} {2,6,..} {1,3,..} permutes the
        // source rows onto these canvas rows
        let canvas_rows = [0, 4, 2, 5, 1, 6, 3, 7];
        for (r, value) in canvas_rows.iter().enumerate() {
            let row = &bitmap.pixels()[r * 32..(r + 1) * 32];
            for px in row.chunks_exact(4) {
                assert_eq!(px, [*value, 0, 0, 0xFF]);
            }
        }
        // the same image encoded without interlacing composites identically
        let plain = interlace_fixture(false, &canvas_rows);
        let mut anim2 = scan(&plain);
        let bitmap2 = anim2.frame_decode(&plain, 0).unwrap();
        assert_eq!(bitmap.pixels(), bitmap2.pixels());
    }

    #[test]
    fn simple_and_complex_paths_agree() {
        // a height-1 interlaced frame visits rows in the same order as a
        // sequential one, so only the decode path differs
        let mut fixtures = Vec::new();
        for interlaced in [false, true] {
            let mut v = vec![
                0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 4, 0, 1, 0, 0x81, 0, 0,
            ];
            for i in 0..4u8 {
                v.extend_from_slice(&[i, i, i]);
            }
            let flags = if interlaced { 0x40 } else { 0x00 };
            v.extend_from_slice(&[0x2C, 0, 0, 0, 0, 4, 0, 1, 0, flags]);
            v.extend_from_slice(&literal_image_data(2, &[0, 1, 2, 3]));
            v.push(0x3B);
            fixtures.push(v);
        }
        let mut fast = scan(&fixtures[0]);
        let mut general = scan(&fixtures[1]);
        fast.frame_decode(&fixtures[0], 0).unwrap();
        general.frame_decode(&fixtures[1], 0).unwrap();
        assert_eq!(pixels(&fast), pixels(&general));
        assert_eq!(
            pixels(&fast),
            [
                0, 0, 0, 0xFF, 1, 1, 1, 0xFF, 2, 2, 2, 0xFF, 3, 3, 3, 0xFF
            ]
        );
    }

    #[test]
    fn size_quirk() {
        // LSD claims 640x480; the canvas grows from the frames instead
        let mut gif = vec![
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x80, 0x02, 0xE0, 0x01,
            0x00, 0x00, 0x00,
        ];
        gif.extend_from_slice(&[0x2C, 0, 0, 0, 0, 2, 0, 2, 0, 0]);
        gif.extend_from_slice(&[0x02, 0x03, 0x04, 0x80, 0x02, 0x00]);
        gif.push(0x3B);
        let anim = scan(&gif);
        let info = anim.info();
        assert_eq!((info.width, info.height), (2, 2));
    }

    #[test]
    fn header_and_trailer_only() {
        let gif =
            [0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 1, 0, 1, 0, 0, 0, 0, 0x3B];
        let mut anim = scan(&gif);
        assert_eq!(anim.info().frame_count, 0);
        assert_eq!(
            anim.frame_prepare().unwrap_err(),
            Error::FrameNoDisplay
        );
    }

    #[test]
    fn incremental_scan() {
        // a growing prefix-stable buffer only ever extends the frame set
        let mut anim = Animation::new(MemoryBitmaps);
        let mut last = 0;
        for len in 1..=TWO_FRAME.len() {
            match anim.data_scan(&TWO_FRAME[..len]) {
                Ok(()) | Err(Error::InsufficientData) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
            let count = anim.info().frame_count;
            assert!(count >= last);
            last = count;
        }
        assert_eq!(anim.info().frame_count, 2);
    }

    #[test]
    fn shrunken_window() {
        let mut anim = scan(MINIMAL);
        assert_eq!(anim.data_scan(&MINIMAL[..10]), Err(Error::DataError));
    }

    #[test]
    fn decode_idempotent() {
        let mut anim = scan(TWO_FRAME);
        anim.frame_decode(TWO_FRAME, 0).unwrap();
        let first = pixels(&anim);
        anim.frame_decode(TWO_FRAME, 0).unwrap();
        assert_eq!(pixels(&anim), first);
    }

    #[test]
    fn reset_replay() {
        let mut anim = scan(TWO_FRAME);
        anim.frame_decode(TWO_FRAME, 0).unwrap();
        let p0 = pixels(&anim);
        anim.frame_decode(TWO_FRAME, 1).unwrap();
        let p1 = pixels(&anim);
        anim.reset();
        anim.frame_decode(TWO_FRAME, 0).unwrap();
        assert_eq!(pixels(&anim), p0);
        anim.frame_decode(TWO_FRAME, 1).unwrap();
        assert_eq!(pixels(&anim), p1);
    }

    #[test]
    fn decode_any_surveyed_frame() {
        // decode order need not match prepare order
        let mut anim = scan(TWO_FRAME);
        anim.frame_decode(TWO_FRAME, 1).unwrap();
        assert_eq!(pixels(&anim), vec![0xFF; 16]);
        assert_eq!(
            anim.frame_decode(TWO_FRAME, 5).unwrap_err(),
            Error::FrameInvalid
        );
    }

    #[test]
    fn restore_background() {
        let mut gif = vec![
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 2, 0, 2, 0, 0x80, 0, 0,
            0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF,
        ];
        // white frame disposed to background, then a 1x1 white frame
        gif.extend_from_slice(&[0x21, 0xF9, 0x04, 0x08, 0x0A, 0, 0, 0]);
        gif.extend_from_slice(&[0x2C, 0, 0, 0, 0, 2, 0, 2, 0, 0]);
        gif.extend_from_slice(&[0x02, 0x03, 0x4C, 0x92, 0x02, 0x00]);
        gif.extend_from_slice(&[0x21, 0xF9, 0x04, 0x04, 0x0A, 0, 0, 0]);
        gif.extend_from_slice(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0]);
        gif.extend_from_slice(&[0x02, 0x02, 0x4C, 0x01, 0x00]);
        gif.push(0x3B);
        let mut anim = scan(&gif);
        anim.frame_decode(&gif, 0).unwrap();
        anim.frame_decode(&gif, 1).unwrap();
        let px = pixels(&anim);
        // frame 0's rectangle restored to the background colour (black)
        // before frame 1 drew its single white pixel
        assert_eq!(&px[..4], &[0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert_eq!(
            &px[4..],
            &[0, 0, 0, 0xFF, 0, 0, 0, 0xFF, 0, 0, 0, 0xFF][..]
        );
    }

    #[test]
    fn transparency_skip() {
        let mut gif = vec![
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 2, 0, 2, 0, 0x80, 0, 0,
            0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF,
        ];
        gif.extend_from_slice(&[0x21, 0xF9, 0x04, 0x04, 0x0A, 0, 0, 0]);
        gif.extend_from_slice(&[0x2C, 0, 0, 0, 0, 2, 0, 2, 0, 0]);
        gif.extend_from_slice(&literal_image_data(2, &[1, 1, 1, 1]));
        // transparent index 1 leaves the white pixels untouched
        gif.extend_from_slice(&[0x21, 0xF9, 0x04, 0x05, 0x0A, 0, 1, 0]);
        gif.extend_from_slice(&[0x2C, 0, 0, 0, 0, 2, 0, 2, 0, 0]);
        gif.extend_from_slice(&literal_image_data(2, &[1, 1, 1, 0]));
        gif.push(0x3B);
        let mut anim = scan(&gif);
        anim.frame_decode(&gif, 0).unwrap();
        anim.frame_decode(&gif, 1).unwrap();
        let px = pixels(&anim);
        assert_eq!(&px[..12], &[0xFF; 12][..]);
        assert_eq!(&px[12..], &[0, 0, 0, 0xFF][..]);
    }

    #[test]
    fn local_colour_table() {
        // a local colour table takes precedence over the global one
        let mut gif = vec![
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 1, 0, 1, 0, 0x80, 0, 0,
            0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF,
        ];
        gif.extend_from_slice(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0x80]);
        gif.extend_from_slice(&[0xAA, 0x00, 0x00, 0x00, 0xBB, 0x00]);
        gif.extend_from_slice(&literal_image_data(2, &[0]));
        gif.push(0x3B);
        let mut anim = scan(&gif);
        let bitmap = anim.frame_decode(&gif, 0).unwrap();
        assert_eq!(bitmap.pixels(), [0xAA, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn opacity_latched() {
        let mut anim = scan(MINIMAL);
        anim.frame_decode(MINIMAL, 0).unwrap();
        let frame = anim.frames.get(0).unwrap();
        assert!(frame.decoded);
        assert!(frame.opaque);
    }
}
