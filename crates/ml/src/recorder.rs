use crate::graph::Node;
use crate::tensor::Tensor;

pub trait Recorder {
    /// Called by every tensor op after its output has been computed.
    fn record(&mut self, node: Node, inputs: &[&Tensor], out: &Tensor);

    fn is_tracking(&self) -> bool {
        true
    }
}

impl<R: Recorder + ?Sized> Recorder for &mut R {
    fn record(&mut self, node: Node, inputs: &[&Tensor], out: &Tensor) {
        (**self).record(node, inputs, out);
    }

    fn is_tracking(&self) -> bool {
        (**self).is_tracking()
    }
}
