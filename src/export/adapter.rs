//! Export wrapper around the prompt encoder and mask decoder
//!
//! Builds the deployment graph: prompts and a precomputed image embedding go
//! in, masks at the original image resolution come out. Work that does not
//! depend on the inputs (dense positional encoding, output tokens, score
//! reweighting) is folded into constants.

use super::dummy::{DummyInputs, OUTPUT_NAMES};
use crate::model::Sam;
use crate::onnx::{DataType, Dim, GraphBuilder, ModelProto};

/// Offset that makes the single-point mask win when only one point is given
const SINGLE_POINT_THRESHOLD: f32 = 2.5;
/// Weight added to the first mask's score per point past the threshold
const SCORE_REWEIGHT: f32 = 1000.0;

/// Prompt-to-mask adapter over a loaded [`Sam`]
#[derive(Debug)]
pub struct SamOnnxAdapter<'a> {
    pub model: &'a Sam,
    /// Keep only the best scoring mask
    pub return_single_mask: bool,
}

impl<'a> SamOnnxAdapter<'a> {
    #[must_use]
    pub fn new(model: &'a Sam, return_single_mask: bool) -> Self {
        Self {
            model,
            return_single_mask,
        }
    }

    /// Masks per prompt in the outputs
    #[must_use]
    pub fn num_output_masks(&self) -> usize {
        if self.return_single_mask {
            1
        } else {
            self.model.mask_decoder.num_mask_tokens
        }
    }

    /// Build the model whose input types follow `dummy`
    #[must_use]
    pub fn to_model(
        &self,
        dummy: &DummyInputs,
        opset: i64,
        metadata: Vec<(String, String)>,
    ) -> ModelProto {
        let pe = &self.model.prompt_encoder;
        let grid = pe.image_embedding_size;
        let mut g = GraphBuilder::new("sam_onnx", opset);

        for tensor in dummy.tensors() {
            g.input(tensor.name, tensor.elem_type(), &tensor.dims());
        }
        let [image_embeddings, point_coords, point_labels, mask_input, has_mask_input, orig_im_size] =
            dummy.tensors().map(|t| t.name);

        let sparse = pe.embed_points(&mut g, point_coords, point_labels);
        let dense = pe.embed_masks(&mut g, mask_input, has_mask_input);

        let image_pe = g.const_f32("image_pe", &[1, grid * grid, pe.embed_dim], &pe.dense_pe_tokens());
        let (mut masks, mut scores) = self.model.mask_decoder.emit(
            &mut g,
            image_embeddings,
            &image_pe,
            grid,
            &sparse,
            &dense,
        );

        if self.return_single_mask {
            (masks, scores) = self.select_masks(&mut g, &masks, &scores, point_coords);
        }

        let upscaled = self.postprocess_masks(&mut g, &masks, orig_im_size);

        let [masks_out, scores_out, low_res_out] = OUTPUT_NAMES;
        g.rename(&upscaled, masks_out);
        g.rename(&scores, scores_out);
        g.rename(&masks, low_res_out);

        let n = self.num_output_masks();
        let low_res = pe.mask_input_size();
        g.output(
            masks_out,
            DataType::Float,
            &[
                Dim::Fixed(1),
                Dim::Fixed(n),
                Dim::Param("orig_height".to_string()),
                Dim::Param("orig_width".to_string()),
            ],
        );
        g.output(scores_out, DataType::Float, &Dim::fixed(&[1, n]));
        g.output(low_res_out, DataType::Float, &Dim::fixed(&[1, n, low_res, low_res]));

        tracing::debug!(nodes = g.node_count(), opset, "built SAM export graph");
        g.build_model(metadata)
    }

    /// Pick the best mask, favouring the first token when several points are given
    fn select_masks(
        &self,
        g: &mut GraphBuilder,
        masks: &str,
        scores: &str,
        point_coords: &str,
    ) -> (String, String) {
        g.push_scope("select_masks");
        let n_tokens = self.model.mask_decoder.num_mask_tokens;
        let mut reweight = vec![0.0; n_tokens];
        reweight[0] = SCORE_REWEIGHT;
        let reweight = g.const_f32("score_reweight", &[1, n_tokens], &reweight);

        let shape = g.unary("Shape", point_coords);
        let axis = g.scalar_i64(1);
        let num_points = g.gather(&shape, &axis, 0);
        let num_points = g.cast(&num_points, DataType::Float);
        let threshold = g.scalar_f32(SINGLE_POINT_THRESHOLD);
        let offset = g.sub(&num_points, &threshold);
        let bonus = g.mul(&offset, &reweight);
        let score = g.add(scores, &bonus);
        let best = g.argmax(&score, 1, false);

        let masks = g.gather(masks, &best, 1);
        let scores = g.gather(scores, &best, 1);
        g.pop_scope();
        (masks, scores)
    }

    /// Upscale to the model input, drop padding, resize to the original image
    fn postprocess_masks(&self, g: &mut GraphBuilder, masks: &str, orig_im_size: &str) -> String {
        g.push_scope("mask_postprocessing");
        let n = self.num_output_masks() as i64;
        let side = self.model.image_size as i64;

        let full = g.const_i64("Resize_sizes", &[4], &[1, n, side, side]);
        let masks = g.resize_bilinear(masks, &full);

        // resize_longest_image_size
        let longest = g.reduce("ReduceMax", orig_im_size, &[0], false);
        let target = g.scalar_f32(self.model.image_size as f32);
        let scale = g.div(&target, &longest);
        let scaled = g.mul(&scale, orig_im_size);
        let half = g.scalar_f32(0.5);
        let rounded = g.add(&scaled, &half);
        let rounded = g.unary("Floor", &rounded);
        let prepadded = g.cast(&rounded, DataType::Int64);

        let starts = g.const_i64("Slice_starts", &[2], &[0, 0]);
        let axes = g.const_i64("Slice_axes", &[2], &[2, 3]);
        let masks = g.slice(&masks, &starts, &prepadded, &axes);

        let orig = g.cast(orig_im_size, DataType::Int64);
        let lead = g.const_i64("Resize_sizes", &[2], &[1, n]);
        let sizes = g.concat(&[lead.as_str(), orig.as_str()], 0);
        let masks = g.resize_bilinear(&masks, &sizes);
        g.pop_scope();
        masks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::ShapeRecorder;
    use crate::export::dummy::INPUT_NAMES;
    use crate::model::lookup;
    use crate::onnx::tensor::value_info_dims;

    fn sam() -> Sam {
        Sam::from_state_dict(lookup("vit_b").unwrap(), &ShapeRecorder::new()).unwrap()
    }

    fn dummy() -> DummyInputs {
        DummyInputs::new(256, 64)
    }

    #[test]
    fn test_inputs_and_outputs_are_named() {
        let sam = sam();
        let model = SamOnnxAdapter::new(&sam, true).to_model(&dummy(), 15, vec![]);
        let graph = model.graph.unwrap();
        let inputs: Vec<_> = graph.input.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(inputs, INPUT_NAMES.to_vec());
        let outputs: Vec<_> = graph.output.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(outputs, OUTPUT_NAMES.to_vec());
        for name in OUTPUT_NAMES {
            assert!(
                graph.node.iter().any(|n| n.output.iter().any(|o| o == name)),
                "{name} is not produced"
            );
        }
    }

    #[test]
    fn test_point_axis_is_dynamic() {
        let sam = sam();
        let model = SamOnnxAdapter::new(&sam, true).to_model(&dummy(), 15, vec![]);
        let graph = model.graph.unwrap();
        let coords = graph.input.iter().find(|i| i.name == "point_coords").unwrap();
        assert_eq!(
            value_info_dims(coords).unwrap(),
            vec![
                Dim::Fixed(1),
                Dim::Param("num_points".to_string()),
                Dim::Fixed(2)
            ]
        );
        let embeddings = graph
            .input
            .iter()
            .find(|i| i.name == "image_embeddings")
            .unwrap();
        assert_eq!(
            value_info_dims(embeddings).unwrap(),
            Dim::fixed(&[1, 256, 64, 64])
        );
    }

    #[test]
    fn test_single_mask_selection_present() {
        let sam = sam();
        let single = SamOnnxAdapter::new(&sam, true).to_model(&dummy(), 15, vec![]);
        let multi = SamOnnxAdapter::new(&sam, false).to_model(&dummy(), 15, vec![]);
        let has_argmax = |m: &ModelProto| {
            m.graph
                .as_ref()
                .unwrap()
                .node
                .iter()
                .any(|n| n.op_type == "ArgMax")
        };
        assert!(has_argmax(&single));
        assert!(!has_argmax(&multi));
    }

    #[test]
    fn test_opset_18_moves_reduce_axes_to_inputs() {
        let sam = sam();
        let model = SamOnnxAdapter::new(&sam, true).to_model(&dummy(), 18, vec![]);
        assert_eq!(model.ir_version, 8);
        let graph = model.graph.unwrap();
        for node in graph.node.iter().filter(|n| n.op_type.starts_with("Reduce")) {
            assert_eq!(node.input.len(), 2, "{}", node.name);
        }
    }
}
