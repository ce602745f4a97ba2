use super::coordinator::GraphBackend;
use super::geometry::VideoRect;
use super::topology::SubGraphKind;
use crate::camera::StillImage;
use crate::config::{CameraConfig, GraphConfig};
use crate::error::GraphError;
use crate::events::{GraphEvent, SessionNotifier};
use crossbeam::channel;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks, AppSrc};
use gstreamer_video as gst_video;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const QUIESCE_TIMEOUT: Duration = Duration::from_secs(1);
const FRAME_PIPE_BLOCKSIZE: u32 = 65536;

/// Encoder and writer branch hanging off the photo tee
struct WriterBranch {
    tee_pad: gst::Pad,
    queue: gst::Element,
    encoder: gst::Element,
    sink: AppSink,
}

/// GStreamer implementation of the media graph.
///
/// Preview and photo bins keep a locked state so the pipeline's own state
/// changes never start them; the coordinator runs them explicitly.
pub struct GstGraphBackend {
    pipeline: gst::Pipeline,
    preview_bin: gst::Bin,
    photo_bin: gst::Bin,
    output_bin: gst::Bin,
    photo_source: AppSrc,
    photo_tee: gst::Element,
    video_filter: gst::Element,
    video_overlay: Option<gst::Element>,
    block_probes: HashMap<SubGraphKind, gst::PadProbeId>,
    writer: Option<WriterBranch>,
    notifier: SessionNotifier,
}

impl GstGraphBackend {
    /// Build the pipeline reading preview frames from `frame_fd`
    pub fn build(
        graph: &GraphConfig,
        camera: &CameraConfig,
        frame_fd: RawFd,
        notifier: SessionNotifier,
    ) -> Result<Self, GraphError> {
        gst::init()?;

        let overlay_location = Path::new(&graph.overlay_image)
            .exists()
            .then(|| graph.overlay_image.clone());
        if overlay_location.is_none() {
            warn!(
                "Overlay image {} not found, compositing disabled",
                graph.overlay_image
            );
        }

        let (preview_bin, video_filter, video_overlay) = build_preview_bin(
            camera,
            frame_fd,
            overlay_location.as_deref(),
            graph.face_detect,
        )?;
        let (photo_bin, photo_source, photo_tee) =
            build_photo_bin(graph, overlay_location.as_deref())?;
        let output_bin = build_output_bin(graph)?;

        let pipeline = gst::Pipeline::builder()
            .name("photobooth-pipeline")
            .build();
        pipeline
            .add_many([
                preview_bin.upcast_ref::<gst::Element>(),
                photo_bin.upcast_ref(),
                output_bin.upcast_ref(),
            ])
            .map_err(|_| GraphError::LinkFailed {
                from: "photobooth-pipeline".to_string(),
                to: "bins".to_string(),
            })?;

        preview_bin.set_locked_state(true);
        photo_bin.set_locked_state(true);

        install_photo_tap(&photo_bin, notifier.clone())?;
        install_bus_handler(&pipeline, &preview_bin, &output_bin, notifier.clone())?;

        info!("Media graph built");
        Ok(Self {
            pipeline,
            preview_bin,
            photo_bin,
            output_bin,
            photo_source,
            photo_tee,
            video_filter,
            video_overlay,
            block_probes: HashMap::new(),
            writer: None,
            notifier,
        })
    }

    fn bin(&self, kind: SubGraphKind) -> &gst::Bin {
        match kind {
            SubGraphKind::Preview => &self.preview_bin,
            SubGraphKind::Photo => &self.photo_bin,
        }
    }

    fn egress_pad(&self, kind: SubGraphKind) -> Result<gst::Pad, GraphError> {
        self.bin(kind)
            .static_pad("src")
            .ok_or_else(|| GraphError::Probe {
                pad: format!("{}:src", kind.bin_name()),
                details: "missing egress pad".to_string(),
            })
    }

    fn set_bin_state(&self, kind: SubGraphKind, state: gst::State) -> Result<(), GraphError> {
        self.bin(kind)
            .set_state(state)
            .map(|_| ())
            .map_err(|e| GraphError::StateChange {
                element: kind.bin_name().to_string(),
                details: format!("{:?}: {}", state, e),
            })
    }
}

impl GraphBackend for GstGraphBackend {
    fn start_output(&mut self) -> Result<(), GraphError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map(|_| ())
            .map_err(|e| GraphError::StateChange {
                element: "photobooth-pipeline".to_string(),
                details: e.to_string(),
            })
    }

    fn start(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        debug!("Starting {} bin", kind);
        self.set_bin_state(kind, gst::State::Playing)
    }

    fn stop(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        debug!("Halting {} bin", kind);
        self.set_bin_state(kind, gst::State::Ready)
    }

    fn block_egress(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        let pad = self.egress_pad(kind)?;

        if let Some(old) = self.block_probes.remove(&kind) {
            pad.remove_probe(old);
        }

        let id = pad
            .add_probe(gst::PadProbeType::DATA_DOWNSTREAM, move |_, _| {
                trace!("Dropped data on blocked {} egress", kind);
                gst::PadProbeReturn::Drop
            })
            .ok_or_else(|| GraphError::Probe {
                pad: format!("{}:src", kind.bin_name()),
                details: "failed to install drop probe".to_string(),
            })?;
        self.block_probes.insert(kind, id);

        if !wait_idle(&pad, QUIESCE_TIMEOUT) {
            warn!("{} egress still busy after {:?}", kind, QUIESCE_TIMEOUT);
        }
        Ok(())
    }

    fn unblock_egress(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        if let Some(id) = self.block_probes.remove(&kind) {
            self.egress_pad(kind)?.remove_probe(id);
            debug!("Unblocked {} egress", kind);
        }
        Ok(())
    }

    fn link(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        let result = self.bin(kind).link(&self.output_bin);
        debug!("Linking {} ! output-bin: {:?}", kind.bin_name(), result.is_ok());
        result.map_err(|_| GraphError::LinkFailed {
            from: kind.bin_name().to_string(),
            to: "output-bin".to_string(),
        })
    }

    fn unlink(&mut self, kind: SubGraphKind) -> Result<(), GraphError> {
        self.bin(kind).unlink(&self.output_bin);
        Ok(())
    }

    fn push_still(&mut self, still: StillImage) -> Result<(), GraphError> {
        let buffer = gst::Buffer::from_mut_slice(still.into_bytes());
        self.photo_source
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| GraphError::Push {
                details: format!("{:?}", e),
            })
    }

    fn attach_writer(&mut self, location: &Path) -> Result<(), GraphError> {
        if self.writer.is_some() {
            return Ok(());
        }

        let queue = make_element("queue", "photo-writer-queue")?;
        let encoder = make_element("jpegenc", "photo-encoder")?;
        let sink = AppSink::builder()
            .name("photo-writer")
            .sync(false)
            .build();
        sink.set_callbacks(write_first_sample(location.to_path_buf(), self.notifier.clone()));

        self.photo_bin
            .add_many([&queue, &encoder, sink.upcast_ref()])
            .map_err(|_| GraphError::Writer {
                details: "failed to add writer elements".to_string(),
            })?;
        gst::Element::link_many([&queue, &encoder, sink.upcast_ref()]).map_err(|_| {
            GraphError::LinkFailed {
                from: "photo-encoder".to_string(),
                to: "photo-writer".to_string(),
            }
        })?;

        let tee_pad = self
            .photo_tee
            .request_pad_simple("src_%u")
            .ok_or_else(|| GraphError::Writer {
                details: "photo tee refused a new branch".to_string(),
            })?;
        let queue_sink = queue.static_pad("sink").ok_or_else(|| GraphError::Writer {
            details: "writer queue has no sink pad".to_string(),
        })?;
        tee_pad
            .link(&queue_sink)
            .map_err(|_| GraphError::LinkFailed {
                from: "photo-tee".to_string(),
                to: "photo-writer-queue".to_string(),
            })?;

        for element in [&queue, &encoder, sink.upcast_ref()] {
            element
                .sync_state_with_parent()
                .map_err(|_| GraphError::StateChange {
                    element: element.name().to_string(),
                    details: "failed to follow photo bin state".to_string(),
                })?;
        }

        info!("Photo writer attached, target {}", location.display());
        self.writer = Some(WriterBranch {
            tee_pad,
            queue,
            encoder,
            sink,
        });
        Ok(())
    }

    fn detach_writer(&mut self) -> Result<(), GraphError> {
        let Some(branch) = self.writer.take() else {
            return Ok(());
        };

        let blocker = branch
            .tee_pad
            .add_probe(gst::PadProbeType::DATA_DOWNSTREAM, |_, _| {
                gst::PadProbeReturn::Drop
            });
        if !wait_idle(&branch.tee_pad, QUIESCE_TIMEOUT) {
            warn!("Photo writer branch still busy, detaching anyway");
        }

        if let Some(queue_sink) = branch.queue.static_pad("sink") {
            let _ = branch.tee_pad.unlink(&queue_sink);
        }
        if let Some(id) = blocker {
            branch.tee_pad.remove_probe(id);
        }
        self.photo_tee.release_request_pad(&branch.tee_pad);

        let elements = [&branch.queue, &branch.encoder, branch.sink.upcast_ref()];
        for element in elements {
            let _ = element.set_state(gst::State::Null);
        }
        self.photo_bin
            .remove_many(elements)
            .map_err(|_| GraphError::Writer {
                details: "failed to remove writer elements".to_string(),
            })?;

        debug!("Photo writer removed");
        Ok(())
    }

    fn resize_preview(&mut self, rect: VideoRect) -> Result<(), GraphError> {
        let caps = gst_video::VideoCapsBuilder::new()
            .width(rect.w)
            .height(rect.h)
            .build();
        self.video_filter.set_property("caps", &caps);

        if let Some(overlay) = &self.video_overlay {
            overlay.set_property("overlay-width", rect.w);
            overlay.set_property("overlay-height", rect.h);
        }

        info!("Preview output dimensions: {}x{}", rect.w, rect.h);
        Ok(())
    }

    fn dump_dot(&self, name: &str) {
        self.pipeline.debug_to_dot_file(gst::DebugGraphDetails::all(), name);
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.detach_writer() {
            warn!("Photo writer teardown failed: {}", e);
        }
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        for kind in [SubGraphKind::Preview, SubGraphKind::Photo] {
            let _ = self.set_bin_state(kind, gst::State::Null);
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!("Failed to stop pipeline: {}", e);
        }
    }
}

fn make_element(factory: &str, name: &str) -> Result<gst::Element, GraphError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|_| GraphError::MissingElement {
            factory: factory.to_string(),
            name: name.to_string(),
        })
}

/// Still overlay, or a pass-through when no overlay asset exists
fn make_overlay(name: &str, location: Option<&str>) -> Result<(gst::Element, bool), GraphError> {
    match location {
        Some(location) => {
            let overlay = make_element("gdkpixbufoverlay", name)?;
            overlay.set_property("location", location);
            Ok((overlay, true))
        }
        None => Ok((make_element("identity", name)?, false)),
    }
}

fn add_and_link(bin: &gst::Bin, elements: &[&gst::Element]) -> Result<(), GraphError> {
    let bin_name = bin.name().to_string();
    bin.add_many(elements.iter().copied())
        .map_err(|_| GraphError::LinkFailed {
            from: bin_name.clone(),
            to: "elements".to_string(),
        })?;
    gst::Element::link_many(elements.iter().copied()).map_err(|_| GraphError::LinkFailed {
        from: bin_name,
        to: "elements".to_string(),
    })
}

fn add_ghost_pad(
    bin: &gst::Bin,
    target: &gst::Pad,
    name: &str,
) -> Result<(), GraphError> {
    let failed = || GraphError::LinkFailed {
        from: bin.name().to_string(),
        to: format!("ghost {}", name),
    };
    let ghost = gst::GhostPad::builder_with_target(target)
        .map_err(|_| failed())?
        .name(name)
        .build();
    ghost.set_active(true).map_err(|_| failed())?;
    bin.add_pad(&ghost).map_err(|_| failed())
}

fn static_pad(element: &gst::Element, name: &str) -> Result<gst::Pad, GraphError> {
    element.static_pad(name).ok_or_else(|| GraphError::Probe {
        pad: format!("{}:{}", element.name(), name),
        details: "no such pad".to_string(),
    })
}

/// fdsrc → jpeg caps → jpegdec → videoscale → videoconvert → caps → overlay,
/// with an optional facedetect stage ahead of the caps filter
fn build_preview_bin(
    camera: &CameraConfig,
    frame_fd: RawFd,
    overlay_location: Option<&str>,
    face_detect: bool,
) -> Result<(gst::Bin, gst::Element, Option<gst::Element>), GraphError> {
    let bin = gst::Bin::builder().name("video-bin").build();

    let source = make_element("fdsrc", "mjpeg-fdsrc")?;
    source.set_property("fd", frame_fd);
    source.set_property("do-timestamp", true);
    source.set_property("blocksize", FRAME_PIPE_BLOCKSIZE);

    let mjpeg_filter = make_element("capsfilter", "mjpeg-capsfilter")?;
    let mjpeg_caps = gst::Caps::builder("image/jpeg")
        .field("width", camera.preview_width as i32)
        .field("height", camera.preview_height as i32)
        .field("framerate", gst::Fraction::new(camera.preview_fps as i32, 1))
        .field("pixel-aspect-ratio", gst::Fraction::new(1, 1))
        .build();
    mjpeg_filter.set_property("caps", &mjpeg_caps);

    let decoder = make_element("jpegdec", "mjpeg-decoder")?;
    let scale = make_element("videoscale", "mjpeg-videoscale")?;
    let convert = make_element("videoconvert", "mjpeg-videoconvert")?;

    let video_filter = make_element("capsfilter", "video-capsfilter")?;
    let video_caps = gst_video::VideoCapsBuilder::new()
        .width(camera.preview_width as i32)
        .height(camera.preview_height as i32)
        .build();
    video_filter.set_property("caps", &video_caps);

    let (overlay, composited) = make_overlay("video-overlay", overlay_location)?;

    let mut chain = vec![source, mjpeg_filter, decoder, scale, convert];
    if face_detect {
        let detector = make_element("facedetect", "video-facedetect")?;
        // Report faces as bus messages only, never draw them
        detector.set_property("display", false);
        chain.push(detector);
        chain.push(make_element("videoconvert", "facedetect-videoconvert")?);
    }
    chain.push(video_filter.clone());
    chain.push(overlay.clone());

    add_and_link(&bin, &chain.iter().collect::<Vec<_>>())?;
    add_ghost_pad(&bin, &static_pad(&overlay, "src")?, "src")?;

    Ok((bin, video_filter, composited.then_some(overlay)))
}

/// appsrc → jpegdec → imagefreeze → videoscale → caps → overlay → tee
fn build_photo_bin(
    graph: &GraphConfig,
    overlay_location: Option<&str>,
) -> Result<(gst::Bin, AppSrc, gst::Element), GraphError> {
    let bin = gst::Bin::builder().name("photo-bin").build();

    let source = AppSrc::builder()
        .name("photo-appsrc")
        .caps(&gst::Caps::builder("image/jpeg").build())
        .format(gst::Format::Time)
        .build();
    let decoder = make_element("jpegdec", "photo-decoder")?;
    let freeze = make_element("imagefreeze", "photo-freeze")?;
    let scale = make_element("videoscale", "photo-scale")?;

    let filter = make_element("capsfilter", "photo-capsfilter")?;
    let caps = gst_video::VideoCapsBuilder::new()
        .width(graph.print_width as i32)
        .height(graph.print_height as i32)
        .framerate(gst::Fraction::new(1, 5))
        .build();
    filter.set_property("caps", &caps);

    let (overlay, composited) = make_overlay("photo-overlay", overlay_location)?;
    if composited {
        overlay.set_property("overlay-width", graph.print_width as i32);
        overlay.set_property("overlay-height", graph.print_height as i32);
    }

    let tee = make_element("tee", "photo-tee")?;

    add_and_link(
        &bin,
        &[
            source.upcast_ref::<gst::Element>(),
            &decoder,
            &freeze,
            &scale,
            &filter,
            &overlay,
            &tee,
        ],
    )?;

    let tee_pad = tee
        .request_pad_simple("src_%u")
        .ok_or_else(|| GraphError::LinkFailed {
            from: "photo-tee".to_string(),
            to: "photo-bin ghost".to_string(),
        })?;
    add_ghost_pad(&bin, &tee_pad, "src")?;

    Ok((bin, source, tee))
}

/// videoconvert → display sink
fn build_output_bin(graph: &GraphConfig) -> Result<gst::Bin, GraphError> {
    let bin = gst::Bin::builder().name("output-bin").build();
    let convert = make_element("videoconvert", "output-videoconvert")?;
    let sink = make_element(&graph.video_sink, "output-sink")?;

    add_and_link(&bin, &[&convert, &sink])?;
    add_ghost_pad(&bin, &static_pad(&convert, "sink")?, "sink")?;
    Ok(bin)
}

/// Report every buffer leaving the photo bin
fn install_photo_tap(photo_bin: &gst::Bin, notifier: SessionNotifier) -> Result<(), GraphError> {
    let pad = photo_bin.static_pad("src").ok_or_else(|| GraphError::Probe {
        pad: "photo-bin:src".to_string(),
        details: "missing egress pad".to_string(),
    })?;

    pad.add_probe(gst::PadProbeType::BUFFER, move |_, _| {
        notifier.post_graph(GraphEvent::PhotoBuffer);
        gst::PadProbeReturn::Ok
    })
    .ok_or_else(|| GraphError::Probe {
        pad: "photo-bin:src".to_string(),
        details: "failed to install buffer tap".to_string(),
    })?;
    Ok(())
}

/// Translate bus messages into session events on the posting thread
fn install_bus_handler(
    pipeline: &gst::Pipeline,
    preview_bin: &gst::Bin,
    output_bin: &gst::Bin,
    notifier: SessionNotifier,
) -> Result<(), GraphError> {
    let bus = pipeline.bus().ok_or_else(|| GraphError::StateChange {
        element: "photobooth-pipeline".to_string(),
        details: "pipeline has no bus".to_string(),
    })?;

    let preview = preview_bin.clone().upcast::<gst::Object>();
    let output = output_bin.clone().upcast::<gst::Object>();

    bus.set_sync_handler(move |_, msg| {
        if let Some(event) = graph_event_for(msg, &preview, &output) {
            notifier.post_graph(event);
        }
        gst::BusSyncReply::Drop
    });
    Ok(())
}

pub(super) fn graph_event_for(
    msg: &gst::Message,
    preview: &gst::Object,
    output: &gst::Object,
) -> Option<GraphEvent> {
    match msg.view() {
        gst::MessageView::Warning(w) => Some(GraphEvent::Warning {
            message: w.error().to_string(),
        }),
        gst::MessageView::Error(e) => Some(GraphEvent::Error {
            message: format!(
                "{}: {}",
                e.error(),
                e.debug().map(|d| d.to_string()).unwrap_or_default()
            ),
        }),
        gst::MessageView::Eos(_) => Some(GraphEvent::EndOfStream),
        gst::MessageView::Element(element) => element
            .structure()
            .filter(|s| s.has_name("facedetect"))
            .map(|s| GraphEvent::Faces(faces_from_structure(s))),
        gst::MessageView::StateChanged(change) => {
            let src = msg.src()?;
            let transition = (change.old(), change.current());
            trace!(
                "{} state transition {:?} -> {:?}",
                src.name(),
                transition.0,
                transition.1
            );

            if src == preview && transition == (gst::State::Paused, gst::State::Playing) {
                Some(GraphEvent::PreviewPlaying)
            } else if src == output && transition == (gst::State::Ready, gst::State::Paused) {
                Some(GraphEvent::OutputPrerolled)
            } else if src == output && transition == (gst::State::Paused, gst::State::Playing) {
                Some(GraphEvent::OutputPlaying)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Face rectangles from a `facedetect` element message, sorted left to right
fn faces_from_structure(structure: &gst::StructureRef) -> Vec<VideoRect> {
    let Ok(faces) = structure.get::<gst::List>("faces") else {
        return Vec::new();
    };

    let coord = |face: &gst::Structure, field: &str| {
        face.get::<u32>(field)
            .ok()
            .and_then(|value| i32::try_from(value).ok())
    };

    let mut rects: Vec<VideoRect> = faces
        .iter()
        .filter_map(|value| value.get::<gst::Structure>().ok())
        .filter_map(|face| {
            Some(VideoRect::new(
                coord(&face, "x")?,
                coord(&face, "y")?,
                coord(&face, "width")?,
                coord(&face, "height")?,
            ))
        })
        .collect();
    rects.sort_by_key(|rect| rect.x);
    rects
}

/// Writer callbacks: the first encoded sample goes to disk, later ones are dropped
fn write_first_sample(location: PathBuf, notifier: SessionNotifier) -> AppSinkCallbacks {
    let written = Arc::new(AtomicBool::new(false));

    AppSinkCallbacks::builder()
        .new_sample(move |sink| {
            let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
            if written.load(Ordering::Acquire) {
                return Ok(gst::FlowSuccess::Ok);
            }

            let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
            let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

            match std::fs::write(&location, map.as_slice()) {
                Ok(()) => {
                    written.store(true, Ordering::Release);
                    info!(
                        "Wrote {} ({} bytes)",
                        location.display(),
                        map.size()
                    );
                    notifier.post_graph(GraphEvent::PhotoWritten {
                        path: location.clone(),
                    });
                }
                Err(e) => {
                    error!("Failed to write {}: {}", location.display(), e);
                    notifier.post_graph(GraphEvent::Warning {
                        message: format!("photo writer: {}", e),
                    });
                }
            }
            Ok(gst::FlowSuccess::Ok)
        })
        .build()
}

/// Block until no buffer is crossing `pad`, or `timeout` elapses
fn wait_idle(pad: &gst::Pad, timeout: Duration) -> bool {
    let (tx, rx) = channel::bounded::<()>(1);
    let installed = pad.add_probe(gst::PadProbeType::IDLE, move |_, _| {
        let _ = tx.try_send(());
        gst::PadProbeReturn::Remove
    });

    if installed.is_none() {
        // Probe ran and removed itself immediately
        return rx.try_recv().is_ok();
    }
    rx.recv_timeout(timeout).is_ok()
}
