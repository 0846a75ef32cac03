use crate::design::model::{Item, VideoDesign};

/// Number of sub-slides each item gets under [`SubSlidePolicy::Fixed`].
pub const FIXED_SUB_SLIDES: usize = 3;

/// How many sub-slides an item decomposes into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubSlidePolicy {
    /// Always headline, main, tip (3 sub-slides), regardless of available text.
    #[default]
    Fixed,
    /// Headline always; main only if `content.main` is present; tip only if `content.details` is.
    ContentDerived,
}

/// Which part of an item a sub-slide shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPart {
    Headline,
    Main,
    Tip,
}

/// Coarse slide kind, used to pick a render function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideKind {
    Title,
    Item,
    Summary,
}

/// Everything a slide needs to be painted. The plan owns it, so rendering never looks back at the
/// design document.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlideContent {
    Title {
        title: String,
        item_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    Item {
        /// 1-based position in the design's item list.
        ordinal: usize,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        main: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        part: ItemPart,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    Summary {
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
}

/// One placed slide.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Slide {
    pub content: SlideContent,
    /// Position inside the owning item's sub-slides; 0 for title and summary.
    pub sub_index: usize,
    pub start_secs: f64,
}

impl Slide {
    pub fn kind(&self) -> SlideKind {
        match self.content {
            SlideContent::Title { .. } => SlideKind::Title,
            SlideContent::Item { .. } => SlideKind::Item,
            SlideContent::Summary { .. } => SlideKind::Summary,
        }
    }
}

/// Ordered, equal-duration slide sequence derived from a design.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SlidePlan {
    slides: Vec<Slide>,
    slide_duration_secs: f64,
    total_duration_secs: f64,
    policy: SubSlidePolicy,
}

/// The slide that is current at some elapsed time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveSlide<'a> {
    pub index: usize,
    pub slide: &'a Slide,
}

impl ActiveSlide<'_> {
    pub fn kind(&self) -> SlideKind {
        self.slide.kind()
    }

    pub fn content(&self) -> &SlideContent {
        &self.slide.content
    }

    pub fn sub_index(&self) -> usize {
        self.slide.sub_index
    }
}

/// Build the slide plan for `design` over `duration_secs`.
///
/// Total and deterministic: an empty item list yields just the title and summary slides. Callers
/// that want the clamped duration pass [`VideoDesign::effective_duration_secs`].
#[tracing::instrument(skip(design), fields(items = design.items.len()))]
pub fn compute_slide_plan(
    design: &VideoDesign,
    duration_secs: f64,
    policy: SubSlidePolicy,
) -> SlidePlan {
    let mut contents = Vec::with_capacity(2 + FIXED_SUB_SLIDES * design.items.len());
    contents.push((
        SlideContent::Title {
            title: design.title.trim().to_owned(),
            item_count: design.items.len(),
            image: design.image.clone(),
        },
        0,
    ));
    for (i, item) in design.items.iter().enumerate() {
        for (sub_index, part) in item_parts(item, policy).into_iter().enumerate() {
            contents.push((item_content(i + 1, item, part), sub_index));
        }
    }
    contents.push((
        SlideContent::Summary {
            image: design.image.clone(),
        },
        0,
    ));

    let total_duration_secs = duration_secs.max(0.0);
    let slide_duration_secs = total_duration_secs / contents.len() as f64;
    let slides = contents
        .into_iter()
        .enumerate()
        .map(|(i, (content, sub_index))| Slide {
            content,
            sub_index,
            start_secs: i as f64 * slide_duration_secs,
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        slides = slides.len(),
        slide_duration_secs,
        "computed slide plan"
    );
    SlidePlan {
        slides,
        slide_duration_secs,
        total_duration_secs,
        policy,
    }
}

fn item_parts(item: &Item, policy: SubSlidePolicy) -> Vec<ItemPart> {
    match policy {
        SubSlidePolicy::Fixed => vec![ItemPart::Headline, ItemPart::Main, ItemPart::Tip],
        SubSlidePolicy::ContentDerived => {
            let mut parts = vec![ItemPart::Headline];
            if item.main_text().is_some() {
                parts.push(ItemPart::Main);
            }
            if item.details_text().is_some() {
                parts.push(ItemPart::Tip);
            }
            parts
        }
    }
}

fn item_content(ordinal: usize, item: &Item, part: ItemPart) -> SlideContent {
    SlideContent::Item {
        ordinal,
        label: item.label().to_owned(),
        main: item.main_text().map(str::to_owned),
        details: item.details_text().map(str::to_owned),
        part,
        image: item.image.clone(),
    }
}

impl SlidePlan {
    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Always `false`: a plan has at least a title and a summary slide.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn slide_duration_secs(&self) -> f64 {
        self.slide_duration_secs
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.total_duration_secs
    }

    pub fn policy(&self) -> SubSlidePolicy {
        self.policy
    }

    /// Index of the slide current at `elapsed_secs`.
    ///
    /// `floor(elapsed / slide_duration)` clamped to the last slide, so ticks that land past the
    /// nominal end keep showing the summary. Negative or NaN elapsed resolves to the first slide.
    pub fn index_at(&self, elapsed_secs: f64) -> usize {
        let last = self.slides.len().saturating_sub(1);
        if !(elapsed_secs > 0.0) {
            return 0;
        }
        if !(self.slide_duration_secs > 0.0) {
            return last;
        }
        let idx = (elapsed_secs / self.slide_duration_secs).floor();
        if idx.is_finite() {
            (idx as usize).min(last)
        } else {
            last
        }
    }

    /// Resolve the slide current at `elapsed_secs`.
    pub fn slide_at(&self, elapsed_secs: f64) -> ActiveSlide<'_> {
        let index = self.index_at(elapsed_secs);
        ActiveSlide {
            index,
            slide: &self.slides[index],
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/template/plan.rs"]
mod tests;
