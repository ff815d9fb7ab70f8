pub mod ami;
pub mod eks;
pub mod kubeadm;
