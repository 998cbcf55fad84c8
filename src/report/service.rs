//! Report rendering over committed state.
//!
//! Both entry points are pure: same state and options, same bytes.

use crate::common::error::{PrequelError, PrequelResult};
use crate::store::domain::ProjectState;

use super::domain::{
    Category, ChunkEntry, ConfusionSection, GenerationEntry, GlobalSection, PlotOptions, ReportDoc,
    ReportOptions, Sections, DOC_VER,
};
use super::gnuplot::Script;

const CHUNK_BLOCK: &str = "data_block_chunk_history";
const GENERATION_BLOCK: &str = "data_block_generation_history";
const MATRIX_BLOCK: &str = "confusion_matrix";

/// Assemble the report document for the selected categories.
pub fn build(state: &ProjectState, options: &ReportOptions) -> ReportDoc {
    let mut sections = Sections::default();
    for category in options.selected() {
        match category {
            Category::Global => sections.global = Some(global_section(state)),
            Category::ChunkHistory => sections.chunk_history = Some(chunk_history(state, options)),
            Category::ConfusionMatrix => sections.confusion_matrix = Some(confusion_matrix(state)),
            Category::GenerationHistory => {
                sections.generation_history = Some(generation_history(state, options))
            }
        }
    }
    ReportDoc {
        doc_ver: DOC_VER,
        error: false,
        category: sections,
    }
}

/// `report_json`: compact JSON of [`build`].
pub fn report_json(state: &ProjectState, options: &str) -> PrequelResult<String> {
    let options = ReportOptions::parse(options)?;
    let doc = build(state, &options);
    Ok(serde_json::to_string(&doc)?)
}

fn global_section(state: &ProjectState) -> GlobalSection {
    let stats = &state.global.stats;
    let last = state.global.next_chunk_id.raw().saturating_sub(1);
    GlobalSection {
        instance_count: stats.instance_count,
        updated_instance_count: stats.updated_instance_count,
        instance_correct_count: stats.instance_correct_count,
        instance_accuracy: stats.instance_accuracy(),
        pending_instance_count: state.chunks.values().map(|c| c.pending_count()).sum(),
        chunk_count: state.chunks.len() as u64,
        last_chunk_id: (last > 0).then_some(last),
        generation_count: state.generations.len() as u64,
    }
}

fn chunk_history(state: &ProjectState, options: &ReportOptions) -> Vec<ChunkEntry> {
    state
        .chunks
        .values()
        .enumerate()
        .map(|(index, chunk)| ChunkEntry {
            datetime: if options.datetime_as_index {
                index as u64
            } else {
                chunk.datetime_ms
            },
            id: chunk.id.raw(),
            instance_count: chunk.instance_count(),
            processed: chunk.processed,
            initial_correct_count: chunk.initial_correct_count,
            initial_accuracy: chunk.initial_accuracy,
        })
        .collect()
}

fn confusion_matrix(state: &ProjectState) -> ConfusionSection {
    let (labels, data, unpredicted) = state.global.stats.confusion.dense();
    ConfusionSection {
        label_name: labels.into_iter().map(|l| l.0).collect(),
        data,
        unpredicted,
    }
}

fn generation_history(state: &ProjectState, options: &ReportOptions) -> Vec<GenerationEntry> {
    state
        .generations
        .iter()
        .enumerate()
        .map(|(index, g)| GenerationEntry {
            datetime: if options.datetime_as_index {
                index as u64
            } else {
                g.datetime_ms
            },
            id: g.id,
            instance_count: g.instance_count,
            before_instance_accuracy: g.before_instance_accuracy,
            after_instance_accuracy: g.after_instance_accuracy,
        })
        .collect()
}

/// `report_plot`: gnuplot script for a document produced by [`report_json`].
pub fn report_plot(json: &str, options: &PlotOptions) -> PrequelResult<String> {
    let doc: ReportDoc = serde_json::from_str(json)
        .map_err(|e| PrequelError::report(format!("not a report document: {e}")))?;
    if doc.doc_ver != DOC_VER {
        return Err(PrequelError::report(format!("unsupported doc_ver {}", doc.doc_ver)));
    }
    let sections = &doc.category;
    let mut script = Script::new();

    script.comment("data block");
    if let Some(chunks) = sections.chunk_history.as_deref().filter(|c| !c.is_empty()) {
        script.data_block(
            CHUNK_BLOCK,
            &[
                chunks.iter().map(|c| c.initial_accuracy).collect(),
                chunks.iter().map(|c| c.instance_count as f64).collect(),
            ],
        )?;
    }
    if let Some(generations) = sections.generation_history.as_deref().filter(|g| !g.is_empty()) {
        script.data_block(
            GENERATION_BLOCK,
            &[
                generations.iter().map(|g| g.before_instance_accuracy).collect(),
                generations.iter().map(|g| g.after_instance_accuracy).collect(),
            ],
        )?;
    }
    if let Some(cm) = sections.confusion_matrix.as_ref().filter(|cm| !cm.label_name.is_empty()) {
        script.matrix_block(MATRIX_BLOCK, &cm.label_name, &cm.data)?;
    }

    script.comment("script");
    script.cmd("set multiplot");

    if let Some(chunks) = &sections.chunk_history {
        script.comment("multiplot: chunk_history");
        script.panel(0.0, 0.67, 1.0, 0.33, Category::ChunkHistory.as_str());
        if !chunks.is_empty() {
            let ticks: Vec<String> = chunks.iter().map(|c| c.datetime.to_string()).collect();
            script
                .line_style(1, "light-red")
                .line_style(2, "blue")
                .cmd("set ytics nomirror")
                .cmd("set y2tics")
                .cmd("set grid")
                .cmd("set ylabel \"initial_accuracy\" textcolor rgb \"light-red\"")
                .cmd("set y2label \"instance_count\" textcolor rgb \"blue\"")
                .xtics("xtics", &ticks, 5)
                .series(CHUNK_BLOCK, 1, "initial_accuracy", 1, None)
                .series(CHUNK_BLOCK, 2, "instance_count", 2, Some("x1y2"))
                .plot();
        }
        script.reset();
    }

    if let Some(generations) = &sections.generation_history {
        script.comment("multiplot: generation_history");
        script.panel(0.0, 0.34, 1.0, 0.33, Category::GenerationHistory.as_str());
        if !generations.is_empty() {
            let ticks: Vec<String> = generations.iter().map(|g| g.datetime.to_string()).collect();
            script
                .line_style(1, "dark-blue")
                .line_style(2, "orange-red")
                .cmd("set grid")
                .cmd("set key")
                .xtics("xtics", &ticks, 3)
                .series(GENERATION_BLOCK, 1, "before_instance_accuracy", 1, None)
                .series(GENERATION_BLOCK, 2, "after_instance_accuracy", 2, None)
                .plot();
        }
        script.reset();
    }

    if let Some(global) = &sections.global {
        script.comment("multiplot: global");
        script.panel(0.0, 0.0, 0.5, 0.33, Category::Global.as_str());
        script.properties(&global.properties(), 27);
        script.reset();
    }

    if let Some(cm) = &sections.confusion_matrix {
        script.comment("multiplot: confusion_matrix");
        script.panel(0.5, 0.0, 0.5, 0.33, Category::ConfusionMatrix.as_str());
        if !cm.label_name.is_empty() {
            let max_count = cm.data.iter().flatten().copied().max().unwrap_or(0);
            let upper = cm.label_name.len() as f64 - 0.5;
            script
                .cmd("unset key")
                .cmd("unset cbtics")
                .cmd("unset xtics")
                .xtics("x2tics", &cm.label_name, cm.label_name.len())
                .cmd("set ytics")
                .cmd(&format!("set xrange [{upper}:-0.5] noreverse nowriteback"))
                .cmd(&format!("set yrange [-0.5:{upper}] noreverse nowriteback"))
                .cmd("set cblabel \"count\"")
                .cmd(&format!("set cbrange [0:{max_count}] noreverse nowriteback"))
                .cmd("set palette rgbformulae -7, 2, -7")
                .cmd("set datafile separator comma")
                .cmd(&format!(
                    "plot ${MATRIX_BLOCK} matrix rowheaders columnheaders using 1:2:3 with image,\\\n     \
                     ${MATRIX_BLOCK}_label matrix using 1:2:(sprintf(\"%g\",$3)) with labels"
                ))
                .cmd("set datafile separator");
        }
        script.reset();
    }

    script.cmd("unset multiplot");
    Ok(script.finish(
        options.terminal.as_deref(),
        options.terminal_option.as_deref(),
        options.font.as_deref(),
        options.output_filepath.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::{ChunkId, FeatureMap, Instance, Label};
    use crate::evaluation::domain::{GenerationRecord, Tally};
    use crate::store::domain::ChunkRecord;

    fn sample_state() -> ProjectState {
        let mut state = ProjectState::default();
        let mut chunk = ChunkRecord::pending(
            ChunkId(1),
            1_700_000_000_000,
            vec![
                Instance::new(FeatureMap::new(), "a"),
                Instance::new(FeatureMap::new(), "b"),
            ],
        );
        let mut tally = Tally::default();
        tally.record(&Label::new("a"), Some(&Label::new("a")));
        tally.record(&Label::new("b"), Some(&Label::new("a")));
        chunk.processed = true;
        chunk.initial_correct_count = 1;
        chunk.initial_accuracy = 0.5;
        chunk.contribution = tally.clone();
        state.global.stats.instance_count = 2;
        state.global.stats.add_scored(&tally);
        state.global.next_chunk_id = ChunkId(2);
        state.chunks.insert(ChunkId(1), chunk);
        state.generations.push(GenerationRecord {
            id: 1,
            datetime_ms: 1_700_000_100_000,
            instance_count: 2,
            before_instance_accuracy: 0.5,
            after_instance_accuracy: 1.0,
        });
        state
    }

    #[test]
    fn json_has_fixed_layout() {
        let json = report_json(&sample_state(), r#"{"categories":["chunk_history","global"],"datetime_as_index":true}"#)
            .unwrap();
        assert!(json.starts_with(r#"{"doc_ver":1,"error":false,"category":{"global":{"instance_count":2,"#));
        assert!(json.contains(r#""chunk_history":[{"datetime":0,"id":1,"instance_count":2,"processed":true,"#));
        assert!(!json.contains("confusion_matrix"));
    }

    #[test]
    fn confusion_matrix_is_dense_and_sorted() {
        let json = report_json(&sample_state(), r#"{"categories":["confusion_matrix"]}"#).unwrap();
        assert!(json.contains(r#""confusion_matrix":{"label_name":["a","b"],"data":[[1,0],[1,0]],"unpredicted":[0,0]}"#));
    }

    #[test]
    fn plot_has_blocks_and_one_panel_per_category() {
        let state = sample_state();
        let json = report_json(&state, "").unwrap();
        let script = report_plot(&json, &PlotOptions::default()).unwrap();
        assert!(script.contains("$data_block_chunk_history << EOD\n0 0.5 2\nEOD\n"));
        assert!(script.contains("$data_block_generation_history << EOD\n0 0.5 1\nEOD\n"));
        for category in Category::ALL {
            assert!(script.contains(&format!("# multiplot: {}", category.as_str())));
        }
        assert!(script.trim_end().ends_with("unset multiplot"));
    }

    #[test]
    fn plot_rejects_garbage_json() {
        assert!(matches!(
            report_plot("[1,2]", &PlotOptions::default()),
            Err(PrequelError::Report(_))
        ));
    }
}
