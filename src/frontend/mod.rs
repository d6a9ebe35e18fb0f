mod listener;

pub(crate) use listener::ClientListener;
