use std::path::{Path, PathBuf};

use crate::config::MuxSection;
use crate::planner::{render_ffmetadata, MuxPlan, Thumbnail};
use crate::title::Identity;

/// A file that must be written before the invocation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideFile {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxInvocation {
    pub index: usize,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output: PathBuf,
    pub chapter_file: Option<SideFile>,
    pub thumbnail: Option<Thumbnail>,
}

/// Turns a plan into a stream-copy ffmpeg invocation. Pure; touches no files.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: PathBuf,
    container: String,
}

impl CommandSynthesizer {
    pub fn new(mux: &MuxSection) -> Self {
        Self {
            program: PathBuf::from(&mux.ffmpeg),
            container: mux.container.clone(),
        }
    }

    pub fn build(&self, plan: &MuxPlan, identity: &Identity) -> MuxInvocation {
        let mut args: Vec<String> = Vec::new();
        let mut inputs = 0usize;

        for video in &plan.video_tracks {
            push_input(&mut args, &mut inputs, video);
        }
        for audio in plan.audio_tracks.iter().filter_map(|track| track.path.as_ref()) {
            push_input(&mut args, &mut inputs, audio);
        }
        for subtitle in &plan.subtitle_tracks {
            push_input(&mut args, &mut inputs, &subtitle.path);
        }

        let chapter_file = (!plan.chapters.is_empty()).then(|| SideFile {
            path: plan.chapter_file(),
            contents: render_ffmetadata(&plan.chapters),
        });
        if let Some(side_file) = &chapter_file {
            let metadata_input = inputs;
            push_input(&mut args, &mut inputs, &side_file.path);
            args.push("-map_metadata".into());
            args.push(metadata_input.to_string());
        }

        args.extend(
            ["-c:v", "copy", "-bsf:v", "filter_units=remove_types=6", "-c:a", "copy"]
                .map(String::from),
        );
        if plan.needs_aac_fixup {
            args.push("-bsf:a".into());
            args.push("aac_adtstoasc".into());
        }
        if !plan.subtitle_tracks.is_empty() {
            args.push("-c:s".into());
            args.push("copy".into());
        }

        for position in 0..plan.video_tracks.len() {
            args.push(format!("-disposition:v:{position}"));
            args.push("+default".into());
        }
        for (position, audio) in plan.audio_tracks.iter().enumerate() {
            args.push(format!("-metadata:s:a:{position}"));
            args.push(format!("language={}", audio.language));
            args.push(format!("-disposition:a:{position}"));
            args.push("+default".into());
        }
        for (position, subtitle) in plan.subtitle_tracks.iter().enumerate() {
            args.push(format!("-metadata:s:s:{position}"));
            args.push(format!("language={}", subtitle.language));
        }

        if let Some(thumbnail) = &plan.thumbnail {
            args.push("-attach".into());
            args.push(path_arg(&thumbnail.attach_as));
            args.push("-metadata:s:t".into());
            args.push(format!("mimetype={}", thumbnail.mime));
        }

        args.push("-metadata".into());
        args.push(format!("title={}", identity.title()));
        if let Some(description) = &plan.description {
            for key in ["description", "comment", "summary", "synopsis"] {
                args.push("-metadata".into());
                args.push(format!("{key}={description}"));
            }
        }

        let output = identity.output_path(&plan.work_dir, &self.container);
        args.push("-y".into());
        args.push(path_arg(&output));

        MuxInvocation {
            index: plan.index,
            program: self.program.clone(),
            args,
            output,
            chapter_file,
            thumbnail: plan.thumbnail.clone(),
        }
    }
}

fn push_input(args: &mut Vec<String>, inputs: &mut usize, path: &Path) {
    args.push("-i".into());
    args.push(path_arg(path));
    *inputs += 1;
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
